// SPDX-License-Identifier: GPL-3.0-or-later
//! Shared data model for the Resonance directory-identification pipeline.
//!
//! These types carry no behavior beyond construction helpers and
//! `Display`/ordering impls; the algorithms that operate on them live in
//! `resonance-identity`, `resonance-identifier`, `resonance-resolver`, and
//! `resonance-planner`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Evidence
// ============================================================================

/// Per-track facts extracted from a directory, prior to any provider lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrackEvidence {
    pub fingerprint_id: Option<String>,
    pub duration_seconds: Option<u32>,
    /// Tag keys are preserved case-sensitively; callers probe alternates.
    pub existing_tags: BTreeMap<String, String>,
}

impl TrackEvidence {
    pub fn new(fingerprint_id: Option<String>, duration_seconds: Option<u32>) -> Self {
        Self {
            fingerprint_id,
            duration_seconds,
            existing_tags: BTreeMap::new(),
        }
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.existing_tags = tags;
        self
    }
}

/// Evidence collected for an entire directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DirectoryEvidence {
    pub tracks: Vec<TrackEvidence>,
    pub track_count: usize,
    pub total_duration_seconds: u64,
}

impl DirectoryEvidence {
    pub fn new(tracks: Vec<TrackEvidence>) -> Self {
        let track_count = tracks.len();
        let total_duration_seconds = tracks
            .iter()
            .filter_map(|t| t.duration_seconds)
            .map(u64::from)
            .sum();
        Self {
            tracks,
            track_count,
            total_duration_seconds,
        }
    }

    pub fn has_fingerprints(&self) -> bool {
        self.tracks
            .iter()
            .any(|t| t.fingerprint_id.as_deref().is_some_and(|fp| !fp.is_empty()))
    }
}

// ============================================================================
// Signature
// ============================================================================

/// Stable per-file signature used to build a `DirectorySignature`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFileSignature {
    pub fingerprint_id: Option<String>,
    pub duration_seconds: Option<u32>,
    pub size_bytes: u64,
}

impl AudioFileSignature {
    /// Sort key used for deterministic ordering prior to hashing.
    /// `size_bytes` participates in ordering only, never in the hash payload.
    pub fn sort_key(&self) -> (String, u32, u64) {
        (
            self.fingerprint_id.clone().unwrap_or_default(),
            self.duration_seconds.unwrap_or(0),
            self.size_bytes,
        )
    }
}

/// Content-addressed signature of a directory's audio files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorySignature {
    pub audio_files: Vec<AudioFileSignature>,
    pub signature_hash: String,
    pub signature_version: u32,
    /// Sorted, informational only — never part of the hash payload.
    pub non_audio_files: Vec<String>,
}

impl DirectorySignature {
    /// `dir_id` is defined to be the signature hash (see `resonance-identity`).
    pub fn dir_id(&self) -> &str {
        &self.signature_hash
    }
}

// ============================================================================
// Providers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
    Single,
    Ep,
    Album,
    Unknown,
}

impl ReleaseKind {
    /// Release-kind inference by track count, per the scoring spec.
    pub fn infer_from_track_count(track_count: usize) -> Self {
        match track_count {
            0..=2 => ReleaseKind::Single,
            3..=6 => ReleaseKind::Ep,
            _ => ReleaseKind::Album,
        }
    }
}

impl fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseKind::Single => write!(f, "single"),
            ReleaseKind::Ep => write!(f, "ep"),
            ReleaseKind::Album => write!(f, "album"),
            ReleaseKind::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTrack {
    pub position: u32,
    pub title: String,
    pub duration_seconds: Option<u32>,
    pub fingerprint_id: Option<String>,
    pub composer: Option<String>,
    pub disc_number: Option<u32>,
    pub recording_id: Option<String>,
}

impl ProviderTrack {
    pub fn new(position: u32, title: impl Into<String>) -> Self {
        Self {
            position,
            title: title.into(),
            duration_seconds: None,
            fingerprint_id: None,
            composer: None,
            disc_number: None,
            recording_id: None,
        }
    }
}

/// A candidate release surfaced by a metadata provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRelease {
    pub provider: String,
    pub release_id: String,
    pub title: String,
    pub artist: String,
    pub tracks: Vec<ProviderTrack>,
    pub year: Option<i32>,
    pub release_kind: Option<ReleaseKind>,
}

impl ProviderRelease {
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn release_kind(&self) -> ReleaseKind {
        self.release_kind
            .unwrap_or_else(|| ReleaseKind::infer_from_track_count(self.track_count()))
    }
}

/// Capabilities declared by a provider client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProviderCapabilities {
    pub supports_fingerprints: bool,
    pub supports_metadata: bool,
}

impl ProviderCapabilities {
    pub fn union(self, other: ProviderCapabilities) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_fingerprints: self.supports_fingerprints || other.supports_fingerprints,
            supports_metadata: self.supports_metadata || other.supports_metadata,
        }
    }
}

// ============================================================================
// Scoring
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseScore {
    pub release: ProviderRelease,
    pub fingerprint_coverage: f64,
    pub track_count_match: bool,
    pub duration_fit: f64,
    pub year_penalty: f64,
    pub total_score: f64,
}

impl ReleaseScore {
    /// Sort key: descending total_score, then ascending provider, then ascending release_id.
    fn rank_key(&self) -> (i64, &str, &str) {
        // total_score is clamped to a fixed-point i64 so the ordering is a
        // total order even across NaN-free float comparisons.
        let scaled = (self.total_score * 1_000_000.0).round() as i64;
        (-scaled, self.release.provider.as_str(), self.release.release_id.as_str())
    }
}

impl Eq for ReleaseScore {}
impl PartialOrd for ReleaseScore {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ReleaseScore {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank_key().cmp(&other.rank_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    Certain,
    Probable,
    Unsure,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::Certain => write!(f, "CERTAIN"),
            ConfidenceTier::Probable => write!(f, "PROBABLE"),
            ConfidenceTier::Unsure => write!(f, "UNSURE"),
        }
    }
}

/// Result of scoring+tiering a directory's evidence against fused candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationResult {
    pub candidates: Vec<ReleaseScore>,
    pub tier: ConfidenceTier,
    pub reasons: Vec<String>,
    pub scoring_version: String,
}

impl IdentificationResult {
    pub fn best_candidate(&self) -> Option<&ReleaseScore> {
        self.candidates.first()
    }
}

// ============================================================================
// Directory lifecycle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectoryState {
    New,
    QueuedPrompt,
    ResolvedAuto,
    ResolvedUser,
    Planned,
    Applied,
    Jailed,
}

impl fmt::Display for DirectoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DirectoryState::New => "NEW",
            DirectoryState::QueuedPrompt => "QUEUED_PROMPT",
            DirectoryState::ResolvedAuto => "RESOLVED_AUTO",
            DirectoryState::ResolvedUser => "RESOLVED_USER",
            DirectoryState::Planned => "PLANNED",
            DirectoryState::Applied => "APPLIED",
            DirectoryState::Jailed => "JAILED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DirectoryState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(DirectoryState::New),
            "QUEUED_PROMPT" => Ok(DirectoryState::QueuedPrompt),
            "RESOLVED_AUTO" => Ok(DirectoryState::ResolvedAuto),
            "RESOLVED_USER" => Ok(DirectoryState::ResolvedUser),
            "PLANNED" => Ok(DirectoryState::Planned),
            "APPLIED" => Ok(DirectoryState::Applied),
            "JAILED" => Ok(DirectoryState::Jailed),
            other => Err(format!("unknown directory state: {other}")),
        }
    }
}

impl DirectoryState {
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            DirectoryState::ResolvedAuto | DirectoryState::ResolvedUser | DirectoryState::Applied
        )
    }
}

/// Persisted per-`dir_id` record owned exclusively by the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub dir_id: String,
    pub last_seen_path: String,
    pub signature_hash: String,
    pub state: DirectoryState,
    pub pinned_provider: Option<String>,
    pub pinned_release_id: Option<String>,
    pub pinned_confidence: Option<f64>,
    pub scoring_version: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DirectoryRecord {
    pub fn new_at(dir_id: impl Into<String>, path: impl Into<String>, signature_hash: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            dir_id: dir_id.into(),
            last_seen_path: path.into(),
            signature_hash: signature_hash.into(),
            state: DirectoryState::New,
            pinned_provider: None,
            pinned_release_id: None,
            pinned_confidence: None,
            scoring_version: None,
            updated_at: now,
        }
    }
}

// ============================================================================
// Domain events
// ============================================================================

/// A lightweight, serializable fact about something that happened to a
/// directory. Purely observational — nothing in the core reads these back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub name: &'static str,
    pub occurred_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: &'static str, occurred_at: DateTime<Utc>, payload: T) -> Self {
        Self {
            name,
            occurred_at,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryResolvedPayload {
    pub dir_id: String,
    pub state: DirectoryState,
    pub pinned_provider: Option<String>,
    pub pinned_release_id: Option<String>,
}

pub type DirectoryResolved = DomainEvent<DirectoryResolvedPayload>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryAppliedPayload {
    pub dir_id: String,
    pub files_moved: usize,
}

pub type DirectoryApplied = DomainEvent<DirectoryAppliedPayload>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_evidence_sums_durations_and_detects_fingerprints() {
        let ev = DirectoryEvidence::new(vec![
            TrackEvidence::new(Some("fp1".into()), Some(180)),
            TrackEvidence::new(None, Some(200)),
        ]);
        assert_eq!(ev.track_count, 2);
        assert_eq!(ev.total_duration_seconds, 380);
        assert!(ev.has_fingerprints());
    }

    #[test]
    fn directory_evidence_without_fingerprints() {
        let ev = DirectoryEvidence::new(vec![TrackEvidence::new(None, Some(100))]);
        assert!(!ev.has_fingerprints());
    }

    #[test]
    fn release_score_orders_by_score_then_provider_then_release_id() {
        let release = |provider: &str, id: &str| ProviderRelease {
            provider: provider.to_string(),
            release_id: id.to_string(),
            title: "T".to_string(),
            artist: "A".to_string(),
            tracks: vec![],
            year: None,
            release_kind: None,
        };
        let mut scores = vec![
            ReleaseScore {
                release: release("discogs", "d1"),
                fingerprint_coverage: 0.0,
                track_count_match: false,
                duration_fit: 0.5,
                year_penalty: 0.0,
                total_score: 0.70,
            },
            ReleaseScore {
                release: release("musicbrainz", "m1"),
                fingerprint_coverage: 1.0,
                track_count_match: true,
                duration_fit: 1.0,
                year_penalty: 0.0,
                total_score: 0.95,
            },
            ReleaseScore {
                release: release("musicbrainz", "m2"),
                fingerprint_coverage: 0.0,
                track_count_match: false,
                duration_fit: 0.5,
                year_penalty: 0.0,
                total_score: 0.70,
            },
        ];
        scores.sort();
        assert_eq!(scores[0].release.release_id, "m1");
        assert_eq!(scores[1].release.release_id, "d1");
        assert_eq!(scores[2].release.release_id, "m2");
    }

    #[test]
    fn directory_state_round_trips_through_display_and_fromstr() {
        use std::str::FromStr;
        for state in [
            DirectoryState::New,
            DirectoryState::QueuedPrompt,
            DirectoryState::ResolvedAuto,
            DirectoryState::ResolvedUser,
            DirectoryState::Planned,
            DirectoryState::Applied,
            DirectoryState::Jailed,
        ] {
            let text = state.to_string();
            assert_eq!(DirectoryState::from_str(&text).unwrap(), state);
        }
    }

    #[test]
    fn release_kind_inference_matches_thresholds() {
        assert_eq!(ReleaseKind::infer_from_track_count(2), ReleaseKind::Single);
        assert_eq!(ReleaseKind::infer_from_track_count(6), ReleaseKind::Ep);
        assert_eq!(ReleaseKind::infer_from_track_count(7), ReleaseKind::Album);
    }
}
