// SPDX-License-Identifier: GPL-3.0-or-later
//! Directory signature computation.
//!
//! `dir_signature` is the sole source of a directory's `dir_id`. The hash
//! payload deliberately excludes `size_bytes` so that tag writes (which
//! change file size) and filesystem moves never perturb identity — only a
//! change to the fingerprint or duration does.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use resonance_domain::{AudioFileSignature, DirectorySignature};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read metadata sidecar for {path}: {source}")]
    SidecarRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed metadata sidecar for {path}: {source}")]
    SidecarParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Stub per-file metadata, read from a `<file>.meta.json` sidecar when
/// present. Production evidence extraction populates these fields from
/// fingerprinting/tag-reading; the sidecar path exists so identity can be
/// computed deterministically in tests and offline tooling without those
/// collaborators.
#[derive(Debug, Default, serde::Deserialize)]
struct StubMetadata {
    fingerprint_id: Option<String>,
    duration_seconds: Option<i64>,
}

/// Compute the signature of a single audio file from filesystem metadata and
/// an optional `.meta.json` sidecar.
pub fn file_signature(path: &Path) -> Result<AudioFileSignature, IdentityError> {
    let stub = read_stub_metadata(path)?;
    let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    Ok(AudioFileSignature {
        fingerprint_id: stub.fingerprint_id,
        duration_seconds: stub
            .duration_seconds
            .and_then(|d| u32::try_from(d).ok()),
        size_bytes,
    })
}

fn read_stub_metadata(path: &Path) -> Result<StubMetadata, IdentityError> {
    let mut sidecar = path.as_os_str().to_os_string();
    sidecar.push(".meta.json");
    let sidecar_path = PathBuf::from(sidecar);

    if !sidecar_path.exists() {
        return Ok(StubMetadata::default());
    }

    let text = std::fs::read_to_string(&sidecar_path).map_err(|source| IdentityError::SidecarRead {
        path: sidecar_path.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| IdentityError::SidecarParse {
        path: sidecar_path,
        source,
    })
}

#[derive(Serialize)]
struct HashPayloadEntry {
    fingerprint_id: Option<String>,
    duration_seconds: Option<u32>,
}

/// Compute a deterministic directory signature from a set of audio file
/// paths. Non-audio files are recorded for informational purposes only and
/// never participate in the hash.
pub fn dir_signature(
    audio_files: impl IntoIterator<Item = PathBuf>,
    non_audio_files: impl IntoIterator<Item = PathBuf>,
) -> Result<DirectorySignature, IdentityError> {
    let mut signatures: Vec<AudioFileSignature> = audio_files
        .into_iter()
        .map(|p| file_signature(&p))
        .collect::<Result<_, _>>()?;
    signatures.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let payload: Vec<HashPayloadEntry> = signatures
        .iter()
        .map(|sig| HashPayloadEntry {
            fingerprint_id: sig.fingerprint_id.clone(),
            duration_seconds: sig.duration_seconds,
        })
        .collect();

    let signature_hash = hash_canonical_json(&payload);

    let mut non_audio_entries: Vec<String> = non_audio_files
        .into_iter()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect();
    non_audio_entries.sort();

    Ok(DirectorySignature {
        audio_files: signatures,
        signature_hash,
        signature_version: 1,
        non_audio_files: non_audio_entries,
    })
}

/// `dir_id` is defined to be the signature hash.
pub fn dir_id(signature: &DirectorySignature) -> String {
    signature.signature_hash.clone()
}

/// Hash a serializable payload as canonical JSON: keys sorted, no
/// insignificant whitespace — matching the Python reference's
/// `json.dumps(payload, sort_keys=True, separators=(",", ":"))`.
///
/// `serde_json` serializes map keys in BTreeMap order by default (no
/// `preserve_order` feature enabled), and struct fields serialize in
/// declaration order; since `HashPayloadEntry` only has two fields and no
/// nested maps, round-tripping through a `BTreeMap<String, serde_json::Value>`
/// per entry guarantees key order matches Python's `sort_keys=True` exactly.
pub fn hash_canonical_json<T: Serialize>(value: &T) -> String {
    let raw = serde_json::to_value(value).expect("payload is always serializable");
    let canonical = canonicalize_value(&raw);
    let serialized = serde_json::to_string(&canonical).expect("canonical value is serializable");
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize_value(v)))
                .collect();
            serde_json::to_value(sorted).expect("sorted map is serializable")
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}
