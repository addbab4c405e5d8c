// SPDX-License-Identifier: GPL-3.0-or-later
//! Resolver — the control plane bridging the state store and the identifier.
//!
//! Enforces the "no re-match" invariant: a directory that is already
//! `RESOLVED_*`, `APPLIED`, `JAILED`, or `QUEUED_PROMPT` never reaches
//! `identify()` again; only a signature change (handled upstream by the
//! state store) can put it back in play.

use resonance_domain::{ConfidenceTier, DirectoryEvidence, DirectoryState, ProviderRelease, ProviderTrack};
use resonance_identifier::{identify, IdentifierError, ProviderClient, SCORING_V1_THRESHOLDS};
use resonance_state::{DirectoryStateStore, StatePins, StateStoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error(transparent)]
    State(#[from] StateStoreError),
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

/// Result of attempting to resolve a single directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveOutcome {
    pub dir_id: String,
    pub state: DirectoryState,
    pub pinned_provider: Option<String>,
    pub pinned_release_id: Option<String>,
    pub pinned_confidence: Option<f64>,
    pub scoring_version: Option<String>,
    pub reasons: Vec<String>,
    pub needs_prompt: bool,
}

impl ResolveOutcome {
    fn unchanged(dir_id: &str, state: DirectoryState, reasons: Vec<String>) -> Self {
        Self {
            dir_id: dir_id.to_string(),
            state,
            pinned_provider: None,
            pinned_release_id: None,
            pinned_confidence: None,
            scoring_version: None,
            reasons,
            needs_prompt: false,
        }
    }
}

/// Resolve a single directory, respecting any already-pinned decision.
///
/// # Arguments
/// - `dir_id`: the directory's content-addressed identifier.
/// - `path`: its current filesystem location.
/// - `signature_hash`: its current content signature.
/// - `evidence`: extracted track evidence for identification.
/// - `store`: the state store of record.
/// - `provider_client`: fused provider client for metadata/fingerprint search.
///
/// # Returns
/// A `ResolveOutcome` describing the directory's resulting state. Provider
/// calls are skipped entirely whenever the record is already resolved,
/// applied, jailed, or queued — see module docs for the full invariant.
pub fn resolve(
    dir_id: &str,
    path: &str,
    signature_hash: &str,
    evidence: &DirectoryEvidence,
    store: &DirectoryStateStore,
    provider_client: &dyn ProviderClient,
) -> Result<ResolveOutcome, ResolverError> {
    let record = store.get_or_create(dir_id, path, signature_hash)?;

    if record.state.is_resolved() {
        debug!(target: "resolver", dir_id, state = %record.state, "already resolved, reusing pinned decision");
        return Ok(ResolveOutcome {
            dir_id: record.dir_id,
            state: record.state,
            pinned_provider: record.pinned_provider,
            pinned_release_id: record.pinned_release_id,
            pinned_confidence: record.pinned_confidence,
            scoring_version: record.scoring_version,
            reasons: vec!["Already resolved - reusing pinned decision".to_string()],
            needs_prompt: false,
        });
    }

    if record.state == DirectoryState::Jailed {
        debug!(target: "resolver", dir_id, "directory is jailed, skipping identification");
        return Ok(ResolveOutcome::unchanged(dir_id, DirectoryState::Jailed, vec!["Directory is jailed".to_string()]));
    }

    if record.state == DirectoryState::QueuedPrompt {
        debug!(target: "resolver", dir_id, "directory already queued for user resolution");
        let mut outcome = ResolveOutcome::unchanged(
            dir_id,
            DirectoryState::QueuedPrompt,
            vec!["Directory already queued for user resolution".to_string()],
        );
        outcome.needs_prompt = true;
        return Ok(outcome);
    }

    if let Some(mb_release_id) = musicbrainz_release_from_tags(evidence) {
        info!(target: "resolver", dir_id, release_id = %mb_release_id, "musicbrainz_albumid present in tags, pinning without provider search");
        let updated = store.set_state(
            dir_id,
            DirectoryState::ResolvedAuto,
            StatePins::Set {
                provider: "musicbrainz".to_string(),
                release_id: mb_release_id.clone(),
                confidence: 1.0,
                scoring_version: None,
            },
        )?;
        // No provider was queried, so there is nothing authoritative to cache
        // beyond what the directory's own tags already assert; synthesize a
        // release from that evidence so a later plan/apply pass still has a
        // full payload to read back instead of re-searching.
        store.cache_release(dir_id, &synthetic_release_from_tags(evidence, &mb_release_id))?;
        return Ok(ResolveOutcome {
            dir_id: updated.dir_id,
            state: updated.state,
            pinned_provider: updated.pinned_provider,
            pinned_release_id: updated.pinned_release_id,
            pinned_confidence: updated.pinned_confidence,
            scoring_version: updated.scoring_version,
            reasons: vec!["musicbrainz_albumid present in tags".to_string()],
            needs_prompt: false,
        });
    }

    let result = identify(evidence, provider_client, &SCORING_V1_THRESHOLDS)?;

    match result.tier {
        ConfidenceTier::Certain => {
            let Some(best) = result.best_candidate() else {
                warn!(target: "resolver", dir_id, "CERTAIN tier with no candidates, queuing for prompt instead");
                return queue_for_prompt(dir_id, &record.state, store, result.reasons);
            };
            info!(target: "resolver", dir_id, provider = %best.release.provider, release_id = %best.release.release_id, score = best.total_score, "auto-resolved");
            let updated = store.set_state(
                dir_id,
                DirectoryState::ResolvedAuto,
                StatePins::Set {
                    provider: best.release.provider.clone(),
                    release_id: best.release.release_id.clone(),
                    confidence: best.total_score,
                    scoring_version: Some(result.scoring_version.clone()),
                },
            )?;
            store.cache_release(dir_id, &best.release)?;
            Ok(ResolveOutcome {
                dir_id: updated.dir_id,
                state: updated.state,
                pinned_provider: updated.pinned_provider,
                pinned_release_id: updated.pinned_release_id,
                pinned_confidence: updated.pinned_confidence,
                scoring_version: updated.scoring_version,
                reasons: result.reasons,
                needs_prompt: false,
            })
        }
        ConfidenceTier::Probable | ConfidenceTier::Unsure => {
            queue_for_prompt(dir_id, &record.state, store, result.reasons)
        }
    }
}

fn queue_for_prompt(
    dir_id: &str,
    current_state: &DirectoryState,
    store: &DirectoryStateStore,
    reasons: Vec<String>,
) -> Result<ResolveOutcome, ResolverError> {
    if *current_state != DirectoryState::QueuedPrompt {
        store.set_state(dir_id, DirectoryState::QueuedPrompt, StatePins::Keep)?;
    }
    Ok(ResolveOutcome {
        dir_id: dir_id.to_string(),
        state: DirectoryState::QueuedPrompt,
        pinned_provider: None,
        pinned_release_id: None,
        pinned_confidence: None,
        scoring_version: None,
        reasons,
        needs_prompt: true,
    })
}

/// Return the MusicBrainz release id if every tagged track agrees on a
/// single non-empty `musicbrainz_albumid`.
fn musicbrainz_release_from_tags(evidence: &DirectoryEvidence) -> Option<String> {
    let mut release_ids: Vec<&str> = evidence
        .tracks
        .iter()
        .filter_map(|t| t.existing_tags.get("musicbrainz_albumid"))
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    release_ids.sort_unstable();
    release_ids.dedup();

    match release_ids.as_slice() {
        [single] => Some((*single).to_string()),
        _ => None,
    }
}

/// Build a `ProviderRelease` from a directory's own tags, for the
/// tag-shortcut path where the `musicbrainz_albumid` match makes a provider
/// search unnecessary. Used only as the payload cached alongside the pin;
/// never fed back into scoring.
fn synthetic_release_from_tags(evidence: &DirectoryEvidence, release_id: &str) -> ProviderRelease {
    let first_tags = evidence.tracks.first().map(|t| &t.existing_tags);
    let lookup = |keys: &[&str]| -> Option<String> {
        first_tags.and_then(|tags| keys.iter().find_map(|k| tags.get(*k)).cloned())
    };

    let artist = lookup(&["albumartist", "artist"]).unwrap_or_default();
    let title = lookup(&["album"]).unwrap_or_default();
    let year = lookup(&["date", "year"]).and_then(|v| v.get(0..4).and_then(|y| y.parse::<i32>().ok()));

    let tracks = evidence
        .tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let position = track
                .existing_tags
                .get("tracknumber")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(index as u32 + 1);
            let track_title = track
                .existing_tags
                .get("title")
                .cloned()
                .unwrap_or_else(|| format!("Track {position}"));
            let mut provider_track = ProviderTrack::new(position, track_title);
            provider_track.duration_seconds = track.duration_seconds;
            provider_track.fingerprint_id = track.fingerprint_id.clone();
            provider_track.disc_number = track.existing_tags.get("discnumber").and_then(|v| v.trim().parse().ok());
            provider_track.recording_id = track.existing_tags.get("musicbrainz_trackid").cloned();
            provider_track
        })
        .collect();

    ProviderRelease {
        provider: "musicbrainz".to_string(),
        release_id: release_id.to_string(),
        title,
        artist,
        tracks,
        year,
        release_kind: None,
    }
}
