//! MusicBrainz-backed provider client.
//!
//! Fingerprint search delegates to the AcoustID lookup endpoint (AcoustID
//! maps fingerprints onto MusicBrainz recordings and release groups);
//! metadata search uses MusicBrainz's own release search, followed by a
//! per-hit release lookup to recover the full tracklist — the same
//! search-then-fetch-details shape as the Discogs client.
//!
//! The core's `ProviderClient` surface is synchronous (SPEC §5); this client
//! is driven through `block_in_place` + `Handle::block_on` at the boundary,
//! the same sync-over-async split used by `resonance-state`.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use resonance_domain::{ProviderCapabilities, ProviderRelease, ProviderTrack};
use resonance_identifier::ProviderClient;

use crate::error::{ProviderError, Result};
use crate::rate_limiter::RateLimiter;

const MUSICBRAINZ_BASE: &str = "https://musicbrainz.org/ws/2";
const ACOUSTID_BASE: &str = "https://api.acoustid.org/v2";
const USER_AGENT: &str = concat!("resonance/", env!("CARGO_PKG_VERSION"), " ( https://example.invalid/resonance )");
const SEARCH_LIMIT: usize = 5;

pub struct MusicBrainzProviderClient {
    client: Client,
    base_url: String,
    acoustid_base_url: String,
    acoustid_api_key: Option<String>,
    rate_limiter: RateLimiter,
}

impl MusicBrainzProviderClient {
    pub fn new(acoustid_api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: MUSICBRAINZ_BASE.to_string(),
            acoustid_base_url: ACOUSTID_BASE.to_string(),
            acoustid_api_key,
            rate_limiter: RateLimiter::new(Duration::from_secs(1)),
        }
    }

    fn block_on<F, T>(&self, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| handle.block_on(fut)),
            Err(_) => tokio::runtime::Runtime::new().expect("tokio runtime").block_on(fut),
        }
    }

    async fn search_by_fingerprints_async(&self, fingerprints: &[String]) -> Result<Vec<ProviderRelease>> {
        let Some(api_key) = &self.acoustid_api_key else {
            warn!(target: "providers::musicbrainz", "no AcoustID API key configured; skipping fingerprint search");
            return Ok(Vec::new());
        };
        if fingerprints.is_empty() {
            return Ok(Vec::new());
        }

        let mut releases = Vec::new();
        let mut sorted_fps = fingerprints.to_vec();
        sorted_fps.sort();
        for fingerprint in &sorted_fps {
            self.rate_limiter.acquire().await;
            let url = format!("{}/lookup", self.acoustid_base_url);
            trace!(target: "providers::musicbrainz", %url, "acoustid lookup");
            let response = self
                .client
                .get(&url)
                .query(&[("client", api_key.as_str()), ("fingerprint", fingerprint.as_str()), ("meta", "recordings+releasegroups")])
                .send()
                .await?;
            if !response.status().is_success() {
                debug!(target: "providers::musicbrainz", status = %response.status(), "acoustid lookup failed; skipping fingerprint");
                continue;
            }
            let body: AcoustIdLookupResponse = response.json().await.map_err(|e| ProviderError::InvalidResponse {
                provider: "musicbrainz",
                detail: e.to_string(),
            })?;
            for result in body.results {
                for recording in result.recordings.unwrap_or_default() {
                    for release_group in recording.releasegroups.unwrap_or_default() {
                        let mut track = ProviderTrack::new(1, recording.title.clone().unwrap_or_default());
                        track.fingerprint_id = Some(fingerprint.clone());
                        track.recording_id = Some(recording.id.clone());
                        releases.push(ProviderRelease {
                            provider: "musicbrainz".to_string(),
                            release_id: release_group.id,
                            title: release_group.title,
                            artist: recording
                                .artists
                                .clone()
                                .unwrap_or_default()
                                .into_iter()
                                .map(|a| a.name)
                                .collect::<Vec<_>>()
                                .join(", "),
                            tracks: vec![track],
                            year: None,
                            release_kind: None,
                        });
                    }
                }
            }
        }
        releases.sort_by(|a, b| a.release_id.cmp(&b.release_id));
        releases.dedup_by(|a, b| a.release_id == b.release_id);
        Ok(releases)
    }

    async fn search_by_metadata_async(&self, artist: Option<&str>, album: Option<&str>, _track_count: usize) -> Result<Vec<ProviderRelease>> {
        if artist.is_none() && album.is_none() {
            return Ok(Vec::new());
        }
        self.rate_limiter.acquire().await;

        let mut query_parts = Vec::new();
        if let Some(artist) = artist {
            query_parts.push(format!("artist:{artist}"));
        }
        if let Some(album) = album {
            query_parts.push(format!("release:{album}"));
        }
        let query = query_parts.join(" AND ");

        let url = format!("{}/release", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("query", query.as_str()), ("fmt", "json"), ("limit", &SEARCH_LIMIT.to_string())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let body: ReleaseSearchResponse = response.json().await.map_err(|e| ProviderError::InvalidResponse {
            provider: "musicbrainz",
            detail: e.to_string(),
        })?;

        let mut releases = Vec::new();
        for hit in body.releases.into_iter().take(SEARCH_LIMIT) {
            self.rate_limiter.acquire().await;
            if let Some(release) = self.fetch_release_detail(&hit.id).await? {
                releases.push(release);
            }
        }
        releases.sort_by(|a, b| a.release_id.cmp(&b.release_id));
        Ok(releases)
    }

    async fn fetch_release_detail(&self, release_id: &str) -> Result<Option<ProviderRelease>> {
        let url = format!("{}/release/{}", self.base_url, release_id);
        let response = self
            .client
            .get(&url)
            .query(&[("fmt", "json"), ("inc", "recordings+artist-credits")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let detail: ReleaseDetail = response.json().await.map_err(|e| ProviderError::InvalidResponse {
            provider: "musicbrainz",
            detail: e.to_string(),
        })?;

        let artist = detail
            .artist_credit
            .unwrap_or_default()
            .into_iter()
            .map(|a| a.name)
            .collect::<Vec<_>>()
            .join(", ");

        let mut tracks = Vec::new();
        for medium in detail.media.unwrap_or_default() {
            let disc_number = medium.position;
            for track in medium.tracks.unwrap_or_default() {
                let mut provider_track = ProviderTrack::new(track.number.parse().unwrap_or(tracks.len() as u32 + 1), track.title);
                provider_track.duration_seconds = track.length.map(|ms| ms / 1000);
                provider_track.disc_number = disc_number;
                provider_track.recording_id = track.recording.map(|r| r.id);
                tracks.push(provider_track);
            }
        }

        Ok(Some(ProviderRelease {
            provider: "musicbrainz".to_string(),
            release_id: detail.id,
            title: detail.title,
            artist,
            tracks,
            year: detail.date.as_deref().and_then(parse_year),
            release_kind: None,
        }))
    }
}

fn parse_year(date: &str) -> Option<i32> {
    date.get(0..4).and_then(|y| y.parse().ok())
}

impl ProviderClient for MusicBrainzProviderClient {
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_fingerprints: true,
            supports_metadata: true,
        }
    }

    fn search_by_fingerprints(&self, fingerprints: &[String]) -> Vec<ProviderRelease> {
        self.block_on(self.search_by_fingerprints_async(fingerprints)).unwrap_or_else(|err| {
            warn!(target: "providers::musicbrainz", %err, "fingerprint search failed; returning empty");
            Vec::new()
        })
    }

    fn search_by_metadata(&self, artist: Option<&str>, album: Option<&str>, track_count: usize) -> Vec<ProviderRelease> {
        self.block_on(self.search_by_metadata_async(artist, album, track_count)).unwrap_or_else(|err| {
            warn!(target: "providers::musicbrainz", %err, "metadata search failed; returning empty");
            Vec::new()
        })
    }
}

#[derive(Debug, Deserialize)]
struct AcoustIdLookupResponse {
    #[serde(default)]
    results: Vec<AcoustIdResult>,
}

#[derive(Debug, Deserialize)]
struct AcoustIdResult {
    #[serde(default)]
    recordings: Option<Vec<AcoustIdRecording>>,
}

#[derive(Debug, Deserialize)]
struct AcoustIdRecording {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artists: Option<Vec<AcoustIdArtist>>,
    #[serde(default)]
    releasegroups: Option<Vec<AcoustIdReleaseGroup>>,
}

#[derive(Debug, Deserialize)]
struct AcoustIdArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AcoustIdReleaseGroup {
    id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseSearchResponse {
    #[serde(default)]
    releases: Vec<ReleaseSearchHit>,
}

#[derive(Debug, Deserialize)]
struct ReleaseSearchHit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseDetail {
    id: String,
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Option<Vec<ArtistCreditEntry>>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    media: Option<Vec<Medium>>,
}

#[derive(Debug, Deserialize)]
struct ArtistCreditEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Medium {
    #[serde(default)]
    position: Option<u32>,
    #[serde(default)]
    tracks: Option<Vec<MediumTrack>>,
}

#[derive(Debug, Deserialize)]
struct MediumTrack {
    number: String,
    title: String,
    #[serde(default)]
    length: Option<u32>,
    #[serde(default)]
    recording: Option<RecordingRef>,
}

#[derive(Debug, Deserialize)]
struct RecordingRef {
    id: String,
}
