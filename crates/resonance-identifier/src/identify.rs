//! The `identify` entry point: gathers provider candidates, scores them, and
//! assigns a confidence tier. Pure — all I/O is delegated to a
//! `ProviderClient`.

use resonance_domain::{DirectoryEvidence, IdentificationResult, ProviderCapabilities, ProviderRelease};
use thiserror::Error;
use tracing::{debug, warn};

use crate::scoring::{calculate_tier, merge_and_rank_candidates, score_release, ScoringThresholds, SCORING_VERSION};

#[derive(Debug, Error)]
pub enum IdentifierError {
    #[error("evidence has fingerprints but provider does not support fingerprint search")]
    FingerprintSearchUnsupported,
    #[error("tags exist but no artist/album hints were extracted for metadata search")]
    DegenerateMetadataSearch,
    #[error("provider does not support metadata search")]
    MetadataSearchUnsupported,
}

/// Abstract interface for provider queries (MusicBrainz, Discogs, ...).
/// Implementations must return deterministically ordered results.
pub trait ProviderClient {
    fn capabilities(&self) -> ProviderCapabilities;
    fn search_by_fingerprints(&self, fingerprints: &[String]) -> Vec<ProviderRelease>;
    fn search_by_metadata(&self, artist: Option<&str>, album: Option<&str>, track_count: usize) -> Vec<ProviderRelease>;
}

fn extract_tag_hint<'a>(tags: &'a std::collections::BTreeMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| tags.get(*k)).map(|s| s.as_str())
}

pub fn identify(
    evidence: &DirectoryEvidence,
    provider_client: &dyn ProviderClient,
    thresholds: &ScoringThresholds,
) -> Result<IdentificationResult, IdentifierError> {
    let mut candidates: Vec<ProviderRelease> = Vec::new();

    if evidence.has_fingerprints() {
        if !provider_client.capabilities().supports_fingerprints {
            return Err(IdentifierError::FingerprintSearchUnsupported);
        }
        let fingerprints: Vec<String> = evidence
            .tracks
            .iter()
            .filter_map(|t| t.fingerprint_id.clone())
            .collect();
        debug!(target: "identifier", count = fingerprints.len(), "searching by fingerprints");
        candidates.extend(provider_client.search_by_fingerprints(&fingerprints));
    }

    let (artist_hint, album_hint) = evidence
        .tracks
        .first()
        .map(|first| {
            let artist = extract_tag_hint(&first.existing_tags, &["albumartist", "artist", "ALBUMARTIST", "ARTIST"]);
            let album = extract_tag_hint(&first.existing_tags, &["album", "ALBUM"]);
            (artist, album)
        })
        .unwrap_or((None, None));

    let tags_exist = evidence.tracks.iter().any(|t| !t.existing_tags.is_empty());
    if artist_hint.is_none() && album_hint.is_none() && tags_exist {
        warn!(target: "identifier", "tags present but no artist/album hint extracted");
        return Err(IdentifierError::DegenerateMetadataSearch);
    }

    if !provider_client.capabilities().supports_metadata {
        return Err(IdentifierError::MetadataSearchUnsupported);
    }

    candidates.extend(provider_client.search_by_metadata(artist_hint, album_hint, evidence.track_count));

    let scored = candidates
        .iter()
        .map(|release| score_release(evidence, release, thresholds))
        .collect();
    let ranked = merge_and_rank_candidates(scored);

    let (tier, mut reasons) = calculate_tier(&ranked, thresholds);

    let mut providers: Vec<&str> = ranked.iter().map(|c| c.release.provider.as_str()).collect();
    providers.sort_unstable();
    providers.dedup();
    if !providers.is_empty() {
        reasons.insert(0, format!("providers={}", providers.join(",")));
    }

    Ok(IdentificationResult {
        candidates: ranked,
        tier,
        reasons,
        scoring_version: SCORING_VERSION.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use resonance_domain::TrackEvidence;

    struct StubProvider {
        caps: ProviderCapabilities,
        fingerprint_results: Vec<ProviderRelease>,
        metadata_results: Vec<ProviderRelease>,
    }

    impl ProviderClient for StubProvider {
        fn capabilities(&self) -> ProviderCapabilities {
            self.caps
        }
        fn search_by_fingerprints(&self, _fingerprints: &[String]) -> Vec<ProviderRelease> {
            self.fingerprint_results.clone()
        }
        fn search_by_metadata(&self, _artist: Option<&str>, _album: Option<&str>, _track_count: usize) -> Vec<ProviderRelease> {
            self.metadata_results.clone()
        }
    }

    #[test]
    fn fingerprint_search_rejected_without_capability() {
        let evidence = DirectoryEvidence::new(vec![TrackEvidence::new(Some("fp1".into()), Some(180))]);
        let provider = StubProvider {
            caps: ProviderCapabilities {
                supports_fingerprints: false,
                supports_metadata: true,
            },
            fingerprint_results: vec![],
            metadata_results: vec![],
        };
        let result = identify(&evidence, &provider, &crate::scoring::SCORING_V1_THRESHOLDS);
        assert!(matches!(result, Err(IdentifierError::FingerprintSearchUnsupported)));
    }

    #[test]
    fn degenerate_metadata_search_rejected_when_tags_exist_without_hints() {
        let mut track = TrackEvidence::new(None, Some(180));
        track.existing_tags.insert("genre".into(), "Electronic".into());
        let evidence = DirectoryEvidence::new(vec![track]);
        let provider = StubProvider {
            caps: ProviderCapabilities {
                supports_fingerprints: false,
                supports_metadata: true,
            },
            fingerprint_results: vec![],
            metadata_results: vec![],
        };
        let result = identify(&evidence, &provider, &crate::scoring::SCORING_V1_THRESHOLDS);
        assert!(matches!(result, Err(IdentifierError::DegenerateMetadataSearch)));
    }

    #[test]
    fn identify_includes_providers_reason_prefix() {
        let evidence = DirectoryEvidence::new(vec![TrackEvidence::new(None, Some(180))]);
        let release = ProviderRelease {
            provider: "musicbrainz".to_string(),
            release_id: "r1".to_string(),
            title: "T".to_string(),
            artist: "A".to_string(),
            tracks: vec![],
            year: None,
            release_kind: None,
        };
        let provider = StubProvider {
            caps: ProviderCapabilities {
                supports_fingerprints: false,
                supports_metadata: true,
            },
            fingerprint_results: vec![],
            metadata_results: vec![release],
        };
        let result = identify(&evidence, &provider, &crate::scoring::SCORING_V1_THRESHOLDS).unwrap();
        assert!(result.reasons[0].starts_with("providers=musicbrainz"));
    }
}
