//! Evidence extraction from directory contents.
//!
//! Fingerprinting and tag reading are external collaborators (§1); this
//! module's job is to assemble `DirectoryEvidence` from whatever the caller
//! already has in hand plus the `.meta.json` sidecar convention used for
//! deterministic fixtures.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use resonance_domain::{DirectoryEvidence, TrackEvidence};

/// Read the `tags` object out of a `<file>.meta.json` sidecar, if any.
/// Malformed or missing sidecars yield an empty tag set rather than an
/// error — evidence extraction never fails on a single bad file.
pub fn read_existing_tags(path: &Path) -> BTreeMap<String, String> {
    let mut sidecar = path.as_os_str().to_os_string();
    sidecar.push(".meta.json");
    let sidecar_path = PathBuf::from(sidecar);

    let Ok(text) = std::fs::read_to_string(&sidecar_path) else {
        return BTreeMap::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
        return BTreeMap::new();
    };
    let Some(tags) = value.get("tags").and_then(|v| v.as_object()) else {
        return BTreeMap::new();
    };

    tags.iter()
        .filter_map(|(k, v)| {
            if v.is_null() {
                None
            } else {
                Some((k.clone(), json_scalar_to_string(v)))
            }
        })
        .collect()
}

fn json_scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Default, serde::Deserialize)]
struct SidecarSignal {
    fingerprint_id: Option<String>,
    duration_seconds: Option<u32>,
}

/// Read the top-level `fingerprint_id`/`duration_seconds` fields out of a
/// `<file>.meta.json` sidecar (the same fields `resonance-identity` hashes
/// into the directory signature). Absent or malformed sidecars yield
/// `(None, None)` rather than an error, matching `read_existing_tags`.
pub fn read_sidecar_signal(path: &Path) -> (Option<String>, Option<u32>) {
    let mut sidecar = path.as_os_str().to_os_string();
    sidecar.push(".meta.json");
    let sidecar_path = PathBuf::from(sidecar);

    let Ok(text) = std::fs::read_to_string(&sidecar_path) else {
        return (None, None);
    };
    let signal: SidecarSignal = serde_json::from_str(&text).unwrap_or_default();
    (signal.fingerprint_id, signal.duration_seconds)
}

/// A minimal pre-extracted view of one track, supplied by the scanner or
/// fingerprint reader before evidence assembly.
#[derive(Debug, Clone, Default)]
pub struct RawTrack {
    pub path: PathBuf,
    pub fingerprint_id: Option<String>,
    pub duration_seconds: Option<u32>,
}

/// Assemble evidence from raw per-track facts, attaching sidecar tags to
/// each track by path.
pub fn extract_evidence(tracks: &[RawTrack]) -> DirectoryEvidence {
    let mut sorted: Vec<&RawTrack> = tracks.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let evidence_tracks: Vec<TrackEvidence> = sorted
        .into_iter()
        .map(|raw| {
            TrackEvidence::new(raw.fingerprint_id.clone(), raw.duration_seconds)
                .with_tags(read_existing_tags(&raw.path))
        })
        .collect();

    DirectoryEvidence::new(evidence_tracks)
}
