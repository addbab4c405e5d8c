// SPDX-License-Identifier: GPL-3.0-or-later

//! Glue between the core crates: turns a scanned `DirectoryBatch` into
//! evidence, drives the resolver, and (once resolved) computes and applies a
//! plan. The core crates themselves stay single-directory-scoped and
//! synchronous (SPEC §5); this module is the sorted-order outer driver.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use resonance_domain::DirectoryRecord;
use resonance_identifier::evidence::{extract_evidence, read_existing_tags, read_sidecar_signal, RawTrack};
use resonance_identifier::ProviderClient;
use resonance_planner::canon::NoopCanonicalizer;
use resonance_planner::tagpatch::{build_patch, ResolvedBy};
use resonance_planner::{
    apply, ApplyError, ApplyReport, ConflictPolicy, MetaJsonTagWriter, MutagenTagWriter, Plan, PlanInput, PlannerError, SourceTrackFile,
    TagWriter,
};
use resonance_resolver::{resolve, ResolveOutcome, ResolverError};
use resonance_scanner::DirectoryBatch;
use resonance_state::{DirectoryStateStore, StateStoreError};

/// Resolve one scanned directory against the state store, deriving evidence
/// from its files' `.meta.json` sidecars.
pub fn resolve_batch(batch: &DirectoryBatch, store: &DirectoryStateStore, provider_client: &dyn ProviderClient) -> Result<ResolveOutcome, ResolverError> {
    let raw_tracks: Vec<RawTrack> = batch
        .files
        .iter()
        .map(|path| {
            let (fingerprint_id, duration_seconds) = read_sidecar_signal(path);
            RawTrack {
                path: path.clone(),
                fingerprint_id,
                duration_seconds,
            }
        })
        .collect();
    let evidence = extract_evidence(&raw_tracks);
    resolve(&batch.dir_id, &batch.directory.to_string_lossy(), &batch.signature.signature_hash, &evidence, store, provider_client)
}

/// Pull the artist/album hint and per-file source metadata a directory needs
/// for planning, out of its sidecar tags.
pub(crate) fn source_files_for(
    batch: &DirectoryBatch,
) -> (Vec<SourceTrackFile>, Vec<BTreeMap<String, String>>, Option<String>, Option<String>) {
    let mut sources = Vec::with_capacity(batch.files.len());
    let mut tags_per_file = Vec::with_capacity(batch.files.len());
    let mut artist_hint = None;
    let mut album_hint = None;

    for (index, path) in batch.files.iter().enumerate() {
        let tags = read_existing_tags(path);
        if artist_hint.is_none() {
            artist_hint = tags.get("albumartist").or_else(|| tags.get("artist")).cloned();
        }
        if album_hint.is_none() {
            album_hint = tags.get("album").cloned();
        }
        let track_number = tags.get("tracknumber").and_then(|v| v.parse().ok()).unwrap_or(index as u32 + 1);
        let disc_number = tags.get("discnumber").and_then(|v| v.parse().ok());
        let title = tags
            .get("title")
            .cloned()
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_else(|| format!("Track {track_number}"));
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("mp3").to_string();

        sources.push(SourceTrackFile {
            path: path.clone(),
            track_number,
            disc_number,
            title,
            extension,
        });
        tags_per_file.push(tags);
    }

    (sources, tags_per_file, artist_hint, album_hint)
}

pub enum PlanningError {
    NotResolved,
    NoPinnedRelease,
    Planner(PlannerError),
    Store(StateStoreError),
}

impl From<PlannerError> for PlanningError {
    fn from(value: PlannerError) -> Self {
        PlanningError::Planner(value)
    }
}

impl From<StateStoreError> for PlanningError {
    fn from(value: StateStoreError) -> Self {
        PlanningError::Store(value)
    }
}

/// Compute a `Plan` + `TagPatch` for an already-resolved directory.
///
/// The release payload comes from the cache the resolver populated at
/// resolve time (`resonance-state::pinned_release_cache`), never from a
/// fresh provider search — a directory that is `RESOLVED_*`/`PLANNED`/
/// `APPLIED` must plan and apply with zero provider calls.
pub fn plan_batch(
    batch: &DirectoryBatch,
    record: &DirectoryRecord,
    library_root: &Path,
    store: &DirectoryStateStore,
) -> Result<(Plan, resonance_planner::TagPatch), PlanningError> {
    if !record.state.is_resolved() {
        return Err(PlanningError::NotResolved);
    }

    let release = store.get_cached_release(&batch.dir_id)?.ok_or(PlanningError::NoPinnedRelease)?;
    let (source_files, tags_per_file, artist_hint, album_hint) = source_files_for(batch);

    let album_title = album_hint.unwrap_or_else(|| release.title.clone());
    let album_artist = artist_hint.unwrap_or_else(|| release.artist.clone());

    let input = PlanInput {
        dir_id: &batch.dir_id,
        library_root,
        album_title: Some(album_title.as_str()),
        artist: Some(album_artist.as_str()),
        composer: None,
        performer: None,
        is_classical: false,
        is_compilation: false,
        year: release.year,
        source_files: &source_files,
        conflict_policy: ConflictPolicy::Fail,
    };

    let plan = resonance_planner::plan(&input, &NoopCanonicalizer, &|p: &Path| p.exists())?;

    let multi_disc = source_files.iter().filter_map(|f| f.disc_number).collect::<std::collections::BTreeSet<_>>().len() > 1;
    let resolved_by = if record.state == resonance_domain::DirectoryState::ResolvedUser {
        ResolvedBy::User
    } else {
        ResolvedBy::Auto
    };
    let tag_patch = build_patch(&plan, &source_files, &tags_per_file, &release, &album_title, &album_artist, multi_disc, resolved_by, Utc::now());

    Ok((plan, tag_patch))
}

/// Build the tag writer for the resolved backend name.
pub fn tag_writer_for(backend: &str) -> Box<dyn TagWriter> {
    match backend {
        "mutagen" => Box::new(MutagenTagWriter),
        _ => Box::new(MetaJsonTagWriter),
    }
}

/// Mark a directory `PLANNED` after a successful plan computation. Planning
/// itself is read-only against the state store; only this transition writes.
pub fn mark_planned(store: &DirectoryStateStore, dir_id: &str) -> Result<(), resonance_state::StateStoreError> {
    store.set_state(dir_id, resonance_domain::DirectoryState::Planned, resonance_state::StatePins::Keep)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn apply_plan(
    plan: &Plan,
    tag_patch: &resonance_planner::TagPatch,
    store: &DirectoryStateStore,
    allowed_roots: &[PathBuf],
    dry_run: bool,
    backend: &str,
) -> Result<ApplyReport, ApplyError> {
    let writer = tag_writer_for(backend);
    apply(plan, tag_patch, store, allowed_roots, dry_run, writer.as_ref(), &|p: &Path| p.exists())
}

pub fn log_outcome(outcome: &ResolveOutcome) {
    info!(
        target: "pipeline",
        dir_id = %outcome.dir_id,
        state = %outcome.state,
        needs_prompt = outcome.needs_prompt,
        "resolved"
    );
    for reason in &outcome.reasons {
        tracing::debug!(target: "pipeline", dir_id = %outcome.dir_id, reason, "reason");
    }
}

pub fn warn_skip(dir_id: &str, reason: &str) {
    warn!(target: "pipeline", dir_id, reason, "skipping directory");
}
