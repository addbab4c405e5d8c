//! Planner: computes the destination layout and per-file renames for a
//! resolved directory, and rejects the plan before any mutation if a
//! destination collides with something outside the plan's own sources.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::canon::NameCanonicalizer;
use crate::filename::build_filename;
use crate::layout::{compute_destination_path, LayoutInput};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("insufficient metadata to compute a destination path")]
    NoDestination,
    #[error("destination already exists and is not part of this plan: {0}")]
    ConflictExists(PathBuf),
}

/// Only `FAIL` is implemented; a `RENAME` policy exists in historical
/// configuration but has no behavior defined (see `resonance-config`, which
/// rejects any non-`Fail` value at load time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    Fail,
}

#[derive(Debug, Clone)]
pub struct SourceTrackFile {
    pub path: PathBuf,
    pub track_number: u32,
    pub disc_number: Option<u32>,
    pub title: String,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub dir_id: String,
    pub destination_root: PathBuf,
    pub files: Vec<PlannedFile>,
}

pub struct PlanInput<'a> {
    pub dir_id: &'a str,
    pub library_root: &'a Path,
    pub album_title: Option<&'a str>,
    pub artist: Option<&'a str>,
    pub composer: Option<&'a str>,
    pub performer: Option<&'a str>,
    pub is_classical: bool,
    pub is_compilation: bool,
    pub year: Option<i32>,
    pub source_files: &'a [SourceTrackFile],
    pub conflict_policy: ConflictPolicy,
}

/// Compute a `Plan`. `source_files` must already be sorted by path (the
/// Applier re-verifies this order; the Planner trusts its caller). `exists`
/// checks whether a path is already present on disk, injected so tests
/// never touch the filesystem.
pub fn plan(
    input: &PlanInput<'_>,
    canonicalizer: &dyn NameCanonicalizer,
    exists: &dyn Fn(&Path) -> bool,
) -> Result<Plan, PlannerError> {
    let layout_input = LayoutInput {
        album_title: input.album_title,
        artist: input.artist,
        composer: input.composer,
        performer: input.performer,
        is_classical: input.is_classical,
        is_compilation: input.is_compilation,
        year: input.year,
        include_year: true,
        include_performer_subdir: true,
    };

    let destination_dir = compute_destination_path(&layout_input, canonicalizer).ok_or(PlannerError::NoDestination)?;
    let destination_root = input.library_root.join(&destination_dir);

    let multi_disc = input
        .source_files
        .iter()
        .filter_map(|f| f.disc_number)
        .collect::<std::collections::BTreeSet<_>>()
        .len()
        > 1;

    let mut files = Vec::with_capacity(input.source_files.len());
    for source in input.source_files {
        let filename = build_filename(source.track_number, source.disc_number, multi_disc, &source.title, &source.extension);
        let destination = destination_root.join(filename);
        files.push(PlannedFile {
            source: source.path.clone(),
            destination,
        });
    }

    check_for_conflicts(&files, exists)?;

    Ok(Plan {
        dir_id: input.dir_id.to_string(),
        destination_root,
        files,
    })
}

fn check_for_conflicts(files: &[PlannedFile], exists: &dyn Fn(&Path) -> bool) -> Result<(), PlannerError> {
    let sources: std::collections::HashSet<&Path> = files.iter().map(|f| f.source.as_path()).collect();
    for file in files {
        if exists(&file.destination) && !sources.contains(file.destination.as_path()) {
            return Err(PlannerError::ConflictExists(file.destination.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::NoopCanonicalizer;

    fn source(path: &str, track: u32) -> SourceTrackFile {
        SourceTrackFile {
            path: PathBuf::from(path),
            track_number: track,
            disc_number: None,
            title: format!("Track {track}"),
            extension: "flac".to_string(),
        }
    }

    #[test]
    fn plan_computes_destination_for_each_file() {
        let input = PlanInput {
            dir_id: "dir1",
            library_root: Path::new("/library"),
            album_title: Some("Vespertine"),
            artist: Some("Bjork"),
            composer: None,
            performer: None,
            is_classical: false,
            is_compilation: false,
            year: Some(2001),
            source_files: &[source("/src/01.flac", 1), source("/src/02.flac", 2)],
            conflict_policy: ConflictPolicy::Fail,
        };
        let result = plan(&input, &NoopCanonicalizer, &|_| false).unwrap();
        assert_eq!(result.files.len(), 2);
        assert_eq!(
            result.files[0].destination,
            PathBuf::from("/library/Bjork/2001 - Vespertine/01 - Track 1.flac")
        );
    }

    #[test]
    fn plan_rejects_conflicting_non_source_destination() {
        let input = PlanInput {
            dir_id: "dir1",
            library_root: Path::new("/library"),
            album_title: Some("Vespertine"),
            artist: Some("Bjork"),
            composer: None,
            performer: None,
            is_classical: false,
            is_compilation: false,
            year: Some(2001),
            source_files: &[source("/src/01.flac", 1)],
            conflict_policy: ConflictPolicy::Fail,
        };
        let result = plan(&input, &NoopCanonicalizer, &|_| true);
        assert!(matches!(result, Err(PlannerError::ConflictExists(_))));
    }

    #[test]
    fn plan_allows_destination_that_is_its_own_source() {
        let input = PlanInput {
            dir_id: "dir1",
            library_root: Path::new("/library"),
            album_title: Some("Vespertine"),
            artist: Some("Bjork"),
            composer: None,
            performer: None,
            is_classical: false,
            is_compilation: false,
            year: Some(2001),
            source_files: &[SourceTrackFile {
                path: PathBuf::from("/library/Bjork/2001 - Vespertine/01 - Track 1.flac"),
                track_number: 1,
                disc_number: None,
                title: "Track 1".to_string(),
                extension: "flac".to_string(),
            }],
            conflict_policy: ConflictPolicy::Fail,
        };
        let exists = |p: &Path| p == Path::new("/library/Bjork/2001 - Vespertine/01 - Track 1.flac");
        let result = plan(&input, &NoopCanonicalizer, &exists);
        assert!(result.is_ok());
    }

    #[test]
    fn multi_disc_filenames_include_disc_prefix() {
        let mut disc1 = source("/src/d1/01.flac", 1);
        disc1.disc_number = Some(1);
        let mut disc2 = source("/src/d2/01.flac", 1);
        disc2.disc_number = Some(2);
        let input = PlanInput {
            dir_id: "dir1",
            library_root: Path::new("/library"),
            album_title: Some("Box Set"),
            artist: Some("Artist"),
            composer: None,
            performer: None,
            is_classical: false,
            is_compilation: false,
            year: Some(1999),
            source_files: &[disc1, disc2],
            conflict_policy: ConflictPolicy::Fail,
        };
        let result = plan(&input, &NoopCanonicalizer, &|_| false).unwrap();
        assert!(result.files[0].destination.to_string_lossy().contains("01-01"));
        assert!(result.files[1].destination.to_string_lossy().contains("02-01"));
    }
}
