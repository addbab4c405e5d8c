//! Applier: atomic move + tag write + state transition.
//!
//! Operates in two phases per the contract: stage the full operation list
//! (fatal, no mutations if anything is wrong), then apply each file
//! atomically, rolling back already-moved files on any later failure.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use resonance_domain::DirectoryState;
use resonance_state::{DirectoryStateStore, StatePins, StateStoreError};

use crate::planner::Plan;
use crate::tagpatch::TagPatch;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("destination {0} is outside every allowed root")]
    OutsideAllowedRoots(PathBuf),
    #[error("destination {0} already exists and is not part of this apply")]
    ConflictExists(PathBuf),
    #[error("plan and tag patch disagree on file count or order")]
    PlanTagPatchMismatch,
    #[error("failed to write tags for {path}: {source}")]
    TagWrite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to move {source_path} to {dest_path}: {source}")]
    Move {
        source_path: PathBuf,
        dest_path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StateStoreError),
}

/// Backend that knows how to persist a file's final tag set.
///
/// `write` is called with the file still at its *source* path (before the
/// rename), so the tag write and the move are two independent steps that
/// the caller sequences per the atomicity contract.
pub trait TagWriter {
    fn write(&self, path: &Path, tags: &BTreeMap<String, String>) -> Result<(), anyhow::Error>;
}

/// Default backend: writes a `<file>.<ext>.meta.json` sidecar, leaving the
/// audio container untouched. Deterministic, used in tests.
pub struct MetaJsonTagWriter;

impl TagWriter for MetaJsonTagWriter {
    fn write(&self, path: &Path, tags: &BTreeMap<String, String>) -> Result<(), anyhow::Error> {
        let sidecar_path = sidecar_path_for(path);
        let mut doc = if sidecar_path.exists() {
            let raw = fs::read_to_string(&sidecar_path)?;
            serde_json::from_str::<serde_json::Value>(&raw).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };
        let object = doc.as_object_mut().ok_or_else(|| anyhow::anyhow!("sidecar is not a JSON object"))?;
        let tags_value = serde_json::to_value(tags)?;
        object.insert("tags".to_string(), tags_value);
        fs::write(&sidecar_path, serde_json::to_vec_pretty(&doc)?)?;
        Ok(())
    }
}

fn sidecar_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".meta.json");
    path.with_file_name(name)
}

/// In-place backend: writes tags directly into the audio container via
/// `lofty`. Multi-valued logical tags are not modeled here (the tag patch
/// already carries one string per key); callers that need multi-value
/// semantics join them on `;` before calling `build_patch`.
pub struct MutagenTagWriter;

impl TagWriter for MutagenTagWriter {
    fn write(&self, path: &Path, tags: &BTreeMap<String, String>) -> Result<(), anyhow::Error> {
        use lofty::config::WriteOptions;
        use lofty::file::{AudioFile, TaggedFileExt};
        use lofty::probe::Probe;
        use lofty::tag::{Accessor, ItemKey, Tag};

        let mut tagged_file = Probe::open(path)?.read()?;
        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag_mut(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file.tag_mut(tag_type).expect("tag just ensured present");

        for (key, value) in tags {
            match key.as_str() {
                "album" => tag.set_album(value.clone()),
                "albumartist" => tag.insert_text(ItemKey::AlbumArtist, value.clone()),
                "artist" => tag.set_artist(value.clone()),
                "title" => tag.set_title(value.clone()),
                "tracknumber" => {
                    if let Ok(n) = value.parse::<u32>() {
                        tag.set_track(n);
                    }
                }
                "discnumber" => {
                    if let Ok(n) = value.parse::<u32>() {
                        tag.set_disk(n);
                    }
                }
                "date" => {
                    if let Ok(y) = value.parse::<u32>() {
                        tag.set_year(y);
                    }
                }
                "musicbrainz_albumid" => tag.insert_text(ItemKey::MusicBrainzReleaseId, value.clone()),
                "musicbrainz_recordingid" => tag.insert_text(ItemKey::MusicBrainzRecordingId, value.clone()),
                other => tag.insert_text(ItemKey::Unknown(other.to_string()), value.clone()),
            }
        }

        tag.save_to_path(path, WriteOptions::default())?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppliedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub dir_id: String,
    pub dry_run: bool,
    pub files: Vec<AppliedFile>,
}

fn is_under_any_root(path: &Path, allowed_roots: &[PathBuf]) -> bool {
    allowed_roots.iter().any(|root| path.starts_with(root))
}

struct StagedOperation<'a> {
    source: &'a Path,
    destination: &'a Path,
    tags: &'a BTreeMap<String, String>,
}

fn stage(
    plan: &Plan,
    tag_patch: &TagPatch,
    allowed_roots: &[PathBuf],
    exists: &dyn Fn(&Path) -> bool,
) -> Result<Vec<StagedOperation<'_>>, ApplyError> {
    if plan.files.len() != tag_patch.files.len() {
        return Err(ApplyError::PlanTagPatchMismatch);
    }

    let sources: std::collections::HashSet<&Path> = plan.files.iter().map(|f| f.source.as_path()).collect();

    let mut staged = Vec::with_capacity(plan.files.len());
    for (planned, patch) in plan.files.iter().zip(tag_patch.files.iter()) {
        if planned.destination != patch.destination {
            return Err(ApplyError::PlanTagPatchMismatch);
        }
        if !is_under_any_root(&planned.destination, allowed_roots) {
            return Err(ApplyError::OutsideAllowedRoots(planned.destination.clone()));
        }
        if exists(&planned.destination) && !sources.contains(planned.destination.as_path()) {
            return Err(ApplyError::ConflictExists(planned.destination.clone()));
        }
        staged.push(StagedOperation {
            source: &planned.source,
            destination: &planned.destination,
            tags: &patch.tags,
        });
    }
    Ok(staged)
}

fn move_file(source: &Path, destination: &Path) -> Result<(), ApplyError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|source_err| ApplyError::Move {
            source_path: source.to_path_buf(),
            dest_path: destination.to_path_buf(),
            source: source_err,
        })?;
    }
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(_) => copy_then_unlink(source, destination),
    }
}

fn copy_then_unlink(source: &Path, destination: &Path) -> Result<(), ApplyError> {
    let temp_sibling = destination.with_extension("resonance-tmp");
    fs::copy(source, &temp_sibling).map_err(|source_err| ApplyError::Move {
        source_path: source.to_path_buf(),
        dest_path: destination.to_path_buf(),
        source: source_err,
    })?;
    let file = fs::File::open(&temp_sibling).map_err(|source_err| ApplyError::Move {
        source_path: source.to_path_buf(),
        dest_path: destination.to_path_buf(),
        source: source_err,
    })?;
    file.sync_all().map_err(|source_err| ApplyError::Move {
        source_path: source.to_path_buf(),
        dest_path: destination.to_path_buf(),
        source: source_err,
    })?;
    fs::rename(&temp_sibling, destination).map_err(|source_err| ApplyError::Move {
        source_path: source.to_path_buf(),
        dest_path: destination.to_path_buf(),
        source: source_err,
    })?;
    fs::remove_file(source).ok();
    Ok(())
}

/// Apply a plan: write tags, then move each file into place, rolling back
/// every file already moved in this invocation if a later file fails.
///
/// A `meta-json` sidecar at the source path, if present, travels with its
/// audio file to the destination — identity (`resonance-identity`) is
/// derived from that sidecar, so leaving it behind would make the moved
/// directory re-scan to a different `dir_id`.
///
/// `exists` is injected so tests never touch the real filesystem for the
/// conflict check; `tag_writer` is the resolved backend (`meta-json` or
/// `mutagen`).
pub fn apply(
    plan: &Plan,
    tag_patch: &TagPatch,
    store: &DirectoryStateStore,
    allowed_roots: &[PathBuf],
    dry_run: bool,
    tag_writer: &dyn TagWriter,
    exists: &dyn Fn(&Path) -> bool,
) -> Result<ApplyReport, ApplyError> {
    let staged = stage(plan, tag_patch, allowed_roots, exists)?;

    if dry_run {
        return Ok(ApplyReport {
            dir_id: plan.dir_id.clone(),
            dry_run: true,
            files: staged
                .iter()
                .map(|op| AppliedFile {
                    source: op.source.to_path_buf(),
                    destination: op.destination.to_path_buf(),
                })
                .collect(),
        });
    }

    let mut moved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(staged.len());
    let mut rollback_stack: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(staged.len() * 2);

    for op in &staged {
        if let Err(err) = tag_writer.write(op.source, op.tags) {
            rollback(&rollback_stack);
            return Err(ApplyError::TagWrite {
                path: op.source.to_path_buf(),
                source: err,
            });
        }
        if let Err(err) = move_file(op.source, op.destination) {
            rollback(&rollback_stack);
            return Err(err);
        }
        rollback_stack.push((op.source.to_path_buf(), op.destination.to_path_buf()));
        moved.push((op.source.to_path_buf(), op.destination.to_path_buf()));

        let sidecar_source = sidecar_path_for(op.source);
        if sidecar_source.exists() {
            let sidecar_destination = sidecar_path_for(op.destination);
            if let Err(err) = move_file(&sidecar_source, &sidecar_destination) {
                rollback(&rollback_stack);
                return Err(err);
            }
            rollback_stack.push((sidecar_source, sidecar_destination));
        }
    }

    store.set_state(&plan.dir_id, DirectoryState::Applied, StatePins::Keep)?;

    Ok(ApplyReport {
        dir_id: plan.dir_id.clone(),
        dry_run: false,
        files: moved
            .into_iter()
            .map(|(source, destination)| AppliedFile { source, destination })
            .collect(),
    })
}

fn rollback(moved: &[(PathBuf, PathBuf)]) {
    for (source, destination) in moved.iter().rev() {
        if fs::rename(destination, source).is_err() {
            let _ = fs::copy(destination, source);
            let _ = fs::remove_file(destination);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlannedFile;
    use crate::tagpatch::FileTagPatch;
    use resonance_state::DirectoryStateStore;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::tempdir;

    struct NullTagWriter;
    impl TagWriter for NullTagWriter {
        fn write(&self, _path: &Path, _tags: &BTreeMap<String, String>) -> Result<(), anyhow::Error> {
            Ok(())
        }
    }

    async fn test_store() -> DirectoryStateStore {
        let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("../../migrations").run(&pool).await.unwrap();
        DirectoryStateStore::from_pool(pool)
    }

    #[tokio::test]
    async fn dry_run_moves_nothing_and_reports_planned_files() {
        let dir = tempdir().unwrap();
        let source_path = dir.path().join("01.flac");
        fs::write(&source_path, b"audio").unwrap();
        let dest_path = dir.path().join("out").join("01 - Track.flac");

        let plan = Plan {
            dir_id: "dir1".to_string(),
            destination_root: dir.path().join("out"),
            files: vec![PlannedFile {
                source: source_path.clone(),
                destination: dest_path.clone(),
            }],
        };
        let tag_patch = TagPatch {
            files: vec![FileTagPatch {
                destination: dest_path.clone(),
                tags: BTreeMap::new(),
            }],
        };
        let store = test_store().await;
        let report = apply(
            &plan,
            &tag_patch,
            &store,
            &[dir.path().to_path_buf()],
            true,
            &NullTagWriter,
            &|p| p.exists(),
        )
        .unwrap();

        assert!(report.dry_run);
        assert!(source_path.exists());
        assert!(!dest_path.exists());
    }

    #[tokio::test]
    async fn apply_moves_file_and_writes_sidecar() {
        let dir = tempdir().unwrap();
        let source_path = dir.path().join("01.flac");
        fs::write(&source_path, b"audio").unwrap();
        let dest_path = dir.path().join("out").join("01 - Track.flac");

        let plan = Plan {
            dir_id: "dir1".to_string(),
            destination_root: dir.path().join("out"),
            files: vec![PlannedFile {
                source: source_path.clone(),
                destination: dest_path.clone(),
            }],
        };
        let mut tags = BTreeMap::new();
        tags.insert("title".to_string(), "Track".to_string());
        let tag_patch = TagPatch {
            files: vec![FileTagPatch {
                destination: dest_path.clone(),
                tags,
            }],
        };
        let store = test_store().await;
        store.get_or_create("dir1", source_path.to_str().unwrap(), "sig-1").unwrap();
        store
            .set_state("dir1", DirectoryState::Planned, StatePins::Keep)
            .unwrap();

        let report = apply(
            &plan,
            &tag_patch,
            &store,
            &[dir.path().to_path_buf()],
            false,
            &MetaJsonTagWriter,
            &|p| p.exists(),
        )
        .unwrap();

        assert!(!report.dry_run);
        assert!(!source_path.exists());
        assert!(dest_path.exists());
        assert!(sidecar_path_for(&dest_path).exists(), "sidecar must travel with its audio file");
        assert!(!sidecar_path_for(&source_path).exists(), "sidecar must not be orphaned at the source");

        let record = store.get("dir1").unwrap().unwrap();
        assert_eq!(record.state, DirectoryState::Applied);
    }

    #[tokio::test]
    async fn rollback_restores_sidecar_alongside_audio_on_later_failure() {
        let dir = tempdir().unwrap();
        let source_one = dir.path().join("01.flac");
        let source_two = dir.path().join("02.flac");
        fs::write(&source_one, b"audio-one").unwrap();
        fs::write(&source_two, b"audio-two").unwrap();
        fs::write(sidecar_path_for(&source_one), b"{}").unwrap();
        let dest_one = dir.path().join("out").join("01 - One.flac");
        let dest_two = dir.path().join("out").join("02 - Two.flac");

        struct FailOnSecondTagWriter;
        impl TagWriter for FailOnSecondTagWriter {
            fn write(&self, path: &Path, _tags: &BTreeMap<String, String>) -> Result<(), anyhow::Error> {
                if path.file_name().and_then(|n| n.to_str()) == Some("02.flac") {
                    Err(anyhow::anyhow!("simulated tag write failure"))
                } else {
                    Ok(())
                }
            }
        }

        let plan = Plan {
            dir_id: "dir1".to_string(),
            destination_root: dir.path().join("out"),
            files: vec![
                PlannedFile {
                    source: source_one.clone(),
                    destination: dest_one.clone(),
                },
                PlannedFile {
                    source: source_two.clone(),
                    destination: dest_two.clone(),
                },
            ],
        };
        let tag_patch = TagPatch {
            files: vec![
                FileTagPatch {
                    destination: dest_one.clone(),
                    tags: BTreeMap::new(),
                },
                FileTagPatch {
                    destination: dest_two.clone(),
                    tags: BTreeMap::new(),
                },
            ],
        };
        let store = test_store().await;
        let result = apply(
            &plan,
            &tag_patch,
            &store,
            &[dir.path().to_path_buf()],
            false,
            &FailOnSecondTagWriter,
            &|p| p.exists(),
        );

        assert!(matches!(result, Err(ApplyError::TagWrite { .. })));
        assert!(source_one.exists(), "first file must be rolled back to its source");
        assert!(!dest_one.exists());
        assert!(
            sidecar_path_for(&source_one).exists(),
            "first file's sidecar must be rolled back alongside it"
        );
        assert!(!sidecar_path_for(&dest_one).exists());
    }

    #[tokio::test]
    async fn refuses_destination_outside_allowed_roots() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        let source_path = dir.path().join("01.flac");
        fs::write(&source_path, b"audio").unwrap();
        let dest_path = other.path().join("01 - Track.flac");

        let plan = Plan {
            dir_id: "dir1".to_string(),
            destination_root: other.path().to_path_buf(),
            files: vec![PlannedFile {
                source: source_path.clone(),
                destination: dest_path.clone(),
            }],
        };
        let tag_patch = TagPatch {
            files: vec![FileTagPatch {
                destination: dest_path.clone(),
                tags: BTreeMap::new(),
            }],
        };
        let store = test_store().await;
        let result = apply(
            &plan,
            &tag_patch,
            &store,
            &[dir.path().to_path_buf()],
            false,
            &NullTagWriter,
            &|p| p.exists(),
        );
        assert!(matches!(result, Err(ApplyError::OutsideAllowedRoots(_))));
        assert!(source_path.exists());
    }

    #[tokio::test]
    async fn refuses_conflicting_non_source_destination() {
        let dir = tempdir().unwrap();
        let source_path = dir.path().join("01.flac");
        fs::write(&source_path, b"audio").unwrap();
        let dest_dir = dir.path().join("out");
        fs::create_dir_all(&dest_dir).unwrap();
        let dest_path = dest_dir.join("01 - Track.flac");
        fs::write(&dest_path, b"already here").unwrap();

        let plan = Plan {
            dir_id: "dir1".to_string(),
            destination_root: dest_dir,
            files: vec![PlannedFile {
                source: source_path.clone(),
                destination: dest_path.clone(),
            }],
        };
        let tag_patch = TagPatch {
            files: vec![FileTagPatch {
                destination: dest_path.clone(),
                tags: BTreeMap::new(),
            }],
        };
        let store = test_store().await;
        let result = apply(
            &plan,
            &tag_patch,
            &store,
            &[dir.path().to_path_buf()],
            false,
            &NullTagWriter,
            &|p| p.exists(),
        );
        assert!(matches!(result, Err(ApplyError::ConflictExists(_))));
        assert!(source_path.exists());
    }
}
