//! Combine multiple providers behind a single `ProviderClient`, with
//! deterministic de-duplication and priority ordering.

use resonance_domain::{ProviderCapabilities, ProviderRelease};
use tracing::warn;

use crate::identify::ProviderClient;
use crate::matchkey::{match_key_album, match_key_artist, match_key_work};

pub struct NamedProvider {
    pub name: String,
    pub client: Box<dyn ProviderClient>,
}

/// A fused `ProviderClient` over several named providers. Searches are
/// dispatched to every provider; a provider that errors (panics are not
/// caught — implementations are expected to return empty results instead)
/// is simply skipped so one provider outage never blocks the others.
pub struct CombinedProviderClient {
    providers: Vec<NamedProvider>,
    priority: Vec<String>,
}

impl CombinedProviderClient {
    pub fn new(providers: Vec<NamedProvider>) -> Self {
        Self::with_priority(providers, vec!["musicbrainz".to_string(), "discogs".to_string()])
    }

    pub fn with_priority(providers: Vec<NamedProvider>, priority: Vec<String>) -> Self {
        Self { providers, priority }
    }

    fn priority_index(&self, provider: &str) -> usize {
        self.priority
            .iter()
            .position(|p| p == provider)
            .unwrap_or(self.priority.len())
    }

    fn collect(&self, search: impl Fn(&dyn ProviderClient) -> Vec<ProviderRelease>) -> Vec<ProviderRelease> {
        let mut releases = Vec::new();
        for named in &self.providers {
            let found = search(named.client.as_ref());
            releases.extend(ensure_provider(&named.name, found));
        }
        releases
    }

    fn dedupe_and_sort(&self, releases: Vec<ProviderRelease>) -> Vec<ProviderRelease> {
        use std::collections::HashMap;

        let mut deduped: HashMap<DedupeKey, ProviderRelease> = HashMap::new();
        for release in releases {
            let key = dedupe_key(&release);
            match deduped.get(&key) {
                None => {
                    deduped.insert(key, release);
                }
                Some(existing) => {
                    if self.priority_index(&release.provider) < self.priority_index(&existing.provider) {
                        deduped.insert(key, release);
                    }
                }
            }
        }

        let mut result: Vec<ProviderRelease> = deduped.into_values().collect();
        result.sort_by(|a, b| {
            self.priority_index(&a.provider)
                .cmp(&self.priority_index(&b.provider))
                .then_with(|| a.release_id.cmp(&b.release_id))
        });
        result
    }
}

type TrackKey = (u32, String);
type DedupeKey = (String, String, Vec<TrackKey>);

fn dedupe_key(release: &ProviderRelease) -> DedupeKey {
    let track_key: Vec<TrackKey> = release
        .tracks
        .iter()
        .map(|track| {
            let ident = track
                .fingerprint_id
                .clone()
                .or_else(|| match_key_work(&track.title))
                .unwrap_or_else(|| track.title.to_lowercase());
            (track.position, ident)
        })
        .collect();

    (
        match_key_album(&release.title).unwrap_or_else(|| release.title.to_lowercase()),
        match_key_artist(&release.artist).unwrap_or_else(|| release.artist.to_lowercase()),
        track_key,
    )
}

fn ensure_provider(name: &str, releases: Vec<ProviderRelease>) -> Vec<ProviderRelease> {
    releases
        .into_iter()
        .map(|release| {
            if release.provider == name {
                release
            } else {
                warn!(target: "fusion", provider = name, declared = %release.provider, "re-stamping release provider");
                ProviderRelease {
                    provider: name.to_string(),
                    ..release
                }
            }
        })
        .collect()
}

impl ProviderClient for CombinedProviderClient {
    fn capabilities(&self) -> ProviderCapabilities {
        self.providers
            .iter()
            .map(|p| p.client.capabilities())
            .fold(ProviderCapabilities::default(), ProviderCapabilities::union)
    }

    fn search_by_fingerprints(&self, fingerprints: &[String]) -> Vec<ProviderRelease> {
        let releases = self.collect(|client| client.search_by_fingerprints(fingerprints));
        self.dedupe_and_sort(releases)
    }

    fn search_by_metadata(&self, artist: Option<&str>, album: Option<&str>, track_count: usize) -> Vec<ProviderRelease> {
        let releases = self.collect(|client| client.search_by_metadata(artist, album, track_count));
        self.dedupe_and_sort(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        caps: ProviderCapabilities,
        releases: Vec<ProviderRelease>,
    }

    impl ProviderClient for FixedProvider {
        fn capabilities(&self) -> ProviderCapabilities {
            self.caps
        }
        fn search_by_fingerprints(&self, _fingerprints: &[String]) -> Vec<ProviderRelease> {
            self.releases.clone()
        }
        fn search_by_metadata(&self, _artist: Option<&str>, _album: Option<&str>, _track_count: usize) -> Vec<ProviderRelease> {
            self.releases.clone()
        }
    }

    fn release(provider: &str, id: &str, title: &str, artist: &str) -> ProviderRelease {
        ProviderRelease {
            provider: provider.to_string(),
            release_id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            tracks: vec![],
            year: None,
            release_kind: None,
        }
    }

    #[test]
    fn prefers_higher_priority_provider_on_duplicate() {
        let mb = NamedProvider {
            name: "musicbrainz".to_string(),
            client: Box::new(FixedProvider {
                caps: ProviderCapabilities {
                    supports_fingerprints: false,
                    supports_metadata: true,
                },
                releases: vec![release("musicbrainz", "m1", "Vespertine", "Bjork")],
            }),
        };
        let discogs = NamedProvider {
            name: "discogs".to_string(),
            client: Box::new(FixedProvider {
                caps: ProviderCapabilities {
                    supports_fingerprints: false,
                    supports_metadata: true,
                },
                releases: vec![release("discogs", "d1", "Vespertine", "Bjork")],
            }),
        };

        let combined = CombinedProviderClient::new(vec![discogs, mb]);
        let result = combined.search_by_metadata(Some("Bjork"), Some("Vespertine"), 0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].provider, "musicbrainz");
    }

    #[test]
    fn aggregates_capabilities_across_providers() {
        let fp_only = NamedProvider {
            name: "acoustid".to_string(),
            client: Box::new(FixedProvider {
                caps: ProviderCapabilities {
                    supports_fingerprints: true,
                    supports_metadata: false,
                },
                releases: vec![],
            }),
        };
        let meta_only = NamedProvider {
            name: "discogs".to_string(),
            client: Box::new(FixedProvider {
                caps: ProviderCapabilities {
                    supports_fingerprints: false,
                    supports_metadata: true,
                },
                releases: vec![],
            }),
        };
        let combined = CombinedProviderClient::new(vec![fp_only, meta_only]);
        let caps = combined.capabilities();
        assert!(caps.supports_fingerprints);
        assert!(caps.supports_metadata);
    }
}
