//! Discogs-backed provider client, ported from the reference `DiscogsClient`:
//! search, then fetch each hit's full release details, then canonicalize.

use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use resonance_domain::{ProviderCapabilities, ProviderRelease, ProviderTrack};
use resonance_identifier::ProviderClient;

use crate::error::{ProviderError, Result};

const SEARCH_LIMIT: usize = 10;

pub struct DiscogsProviderClient {
    client: Client,
    token: String,
    user_agent: String,
}

impl DiscogsProviderClient {
    pub fn new(token: String) -> Self {
        let client = Client::builder().timeout(Duration::from_secs(10)).build().unwrap_or_else(|_| Client::new());
        Self {
            client,
            token,
            user_agent: format!("resonance/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    async fn search_by_metadata_async(&self, artist: Option<&str>, album: Option<&str>) -> Result<Vec<ProviderRelease>> {
        let mut query: Vec<(&str, String)> = vec![
            ("token", self.token.clone()),
            ("type", "release".to_string()),
            ("per_page", SEARCH_LIMIT.to_string()),
        ];
        if let Some(artist) = artist {
            query.push(("artist", artist.to_string()));
        }
        if let Some(album) = album {
            query.push(("release_title", album.to_string()));
        }

        let response = self
            .client
            .get("https://api.discogs.com/database/search")
            .header("User-Agent", &self.user_agent)
            .query(&query)
            .send()
            .await?;
        if !response.status().is_success() {
            debug!(target: "providers::discogs", status = %response.status(), "discogs search failed");
            return Ok(Vec::new());
        }
        let payload: SearchResponse = response.json().await.map_err(|e| ProviderError::InvalidResponse {
            provider: "discogs",
            detail: e.to_string(),
        })?;

        let mut releases = Vec::new();
        for result in payload.results {
            let Some(release_id) = result.id else { continue };
            let Some(details) = self.fetch_release(release_id).await? else { continue };
            releases.push(release_from_payload(&result, &details));
        }
        releases.sort_by(|a, b| a.release_id.cmp(&b.release_id));
        Ok(releases)
    }

    async fn fetch_release(&self, release_id: u64) -> Result<Option<ReleaseDetail>> {
        let url = format!("https://api.discogs.com/releases/{release_id}?token={}", self.token);
        let response = self.client.get(&url).header("User-Agent", &self.user_agent).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let detail = response.json().await.map_err(|e| ProviderError::InvalidResponse {
            provider: "discogs",
            detail: e.to_string(),
        })?;
        Ok(Some(detail))
    }
}

impl ProviderClient for DiscogsProviderClient {
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_fingerprints: false,
            supports_metadata: true,
        }
    }

    fn search_by_fingerprints(&self, _fingerprints: &[String]) -> Vec<ProviderRelease> {
        Vec::new()
    }

    fn search_by_metadata(&self, artist: Option<&str>, album: Option<&str>, _track_count: usize) -> Vec<ProviderRelease> {
        block_on(self.search_by_metadata_async(artist, album)).unwrap_or_else(|err| {
            tracing::warn!(target: "providers::discogs", %err, "metadata search failed; returning empty");
            Vec::new()
        })
    }
}

fn block_on<F, T>(fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(fut)),
        Err(_) => tokio::runtime::Runtime::new().expect("tokio runtime").block_on(fut),
    }
}

fn release_from_payload(result: &SearchResult, details: &ReleaseDetail) -> ProviderRelease {
    let release_id = details.id.map(|id| id.to_string()).unwrap_or_else(|| result.id.map(|id| id.to_string()).unwrap_or_default());

    let search_title = result.release_title.clone().or_else(|| result.title.clone());
    let (parsed_artist, parsed_title) = split_search_title(search_title.as_deref());

    let mut title = search_title;
    if let Some(parsed_title) = parsed_title {
        title = Some(parsed_title);
    }
    let title = title.unwrap_or_else(|| details.title.clone().unwrap_or_else(|| "Unknown".to_string()));

    let artist = result
        .artist
        .clone()
        .or(parsed_artist)
        .or_else(|| join_artists(&details.artists))
        .unwrap_or_else(|| "Unknown".to_string());

    let year = result.year.or(details.year);
    let tracks = parse_tracklist(&details.tracklist);
    let release_kind = infer_release_kind(&title, tracks.len(), &details.formats);

    ProviderRelease {
        provider: "discogs".to_string(),
        release_id,
        title,
        artist,
        tracks,
        year,
        release_kind,
    }
}

fn split_search_title(value: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(value) = value else { return (None, None) };
    let Some((artist, title)) = value.split_once(" - ") else {
        return (None, None);
    };
    let artist = artist.trim();
    let title = title.trim();
    (
        (!artist.is_empty()).then(|| artist.to_string()),
        (!title.is_empty()).then(|| title.to_string()),
    )
}

fn join_artists(artists: &[DiscogsArtist]) -> Option<String> {
    let names: Vec<String> = artists.iter().filter_map(|a| a.name.clone()).collect();
    normalize_artist_string(&names.join(", "))
}

fn normalize_artist_string(value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let mut cleaned = Vec::new();
    for chunk in value.split([';', ',']) {
        let base = chunk.split(" (").next().unwrap_or("").trim();
        if !base.is_empty() {
            cleaned.push(base.to_string());
        }
    }
    let mut unique = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for entry in cleaned {
        let token = entry.to_lowercase();
        if seen.insert(token) {
            unique.push(entry);
        }
    }
    if unique.is_empty() {
        None
    } else {
        Some(unique.join(", "))
    }
}

fn parse_tracklist(tracklist: &[TracklistEntry]) -> Vec<ProviderTrack> {
    let mut tracks = Vec::new();
    let mut fallback_position = 1u32;
    for entry in tracklist {
        if matches!(entry.entry_type.as_deref(), Some("heading") | Some("index")) {
            continue;
        }
        let Some(title) = entry.title.clone() else { continue };
        let (disc_number, position) = parse_track_position(entry.position.as_deref());
        let position = position.unwrap_or(fallback_position);
        fallback_position += 1;
        let mut track = ProviderTrack::new(position, title);
        track.duration_seconds = entry.duration.as_deref().and_then(parse_duration);
        track.disc_number = disc_number;
        tracks.push(track);
    }
    tracks
}

fn parse_track_position(position: Option<&str>) -> (Option<u32>, Option<u32>) {
    let Some(position) = position else { return (None, None) };
    let cleaned = position.trim();
    if cleaned.is_empty() {
        return (None, None);
    }
    if let Ok(n) = cleaned.parse::<u32>() {
        return (None, Some(n));
    }
    let disc_track = Regex::new(r"^\s*[A-Za-z]*\s*(\d+)\s*[-./]\s*(\d+)\s*$").unwrap();
    if let Some(caps) = disc_track.captures(cleaned) {
        let disc = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let track = caps.get(2).and_then(|m| m.as_str().parse().ok());
        return (disc, track);
    }
    let letter_side = Regex::new(r"^\s*([A-Za-z])\s*$").unwrap();
    if let Some(caps) = letter_side.captures(cleaned) {
        let letter = caps.get(1).unwrap().as_str().to_uppercase().chars().next().unwrap();
        return (None, Some(letter as u32 - 'A' as u32 + 1));
    }
    let letters_then_digits = Regex::new(r"^\s*[A-Za-z]+\s*(\d+)\s*$").unwrap();
    if let Some(caps) = letters_then_digits.captures(cleaned) {
        return (None, caps.get(1).and_then(|m| m.as_str().parse().ok()));
    }
    let digits: String = cleaned.chars().filter(|c| c.is_ascii_digit()).collect();
    (None, digits.parse().ok())
}

fn parse_duration(value: &str) -> Option<u32> {
    let (minutes, seconds) = value.split_once(':')?;
    let minutes: u32 = minutes.parse().ok()?;
    let seconds: u32 = seconds.parse().ok()?;
    Some(minutes * 60 + seconds)
}

fn infer_release_kind(title: &str, track_count: usize, formats: &[Value]) -> Option<resonance_domain::ReleaseKind> {
    use resonance_domain::ReleaseKind;
    let title_lower = title.to_lowercase();
    if title_lower.split_whitespace().any(|w| w == "ep") {
        return Some(ReleaseKind::Ep);
    }
    if title_lower.split_whitespace().any(|w| w == "single") {
        return Some(ReleaseKind::Single);
    }
    for format in formats {
        let Some(obj) = format.as_object() else { continue };
        let mut tokens = Vec::new();
        if let Some(name) = obj.get("name").and_then(Value::as_str) {
            tokens.push(name.to_lowercase());
        }
        if let Some(descriptions) = obj.get("descriptions").and_then(Value::as_array) {
            tokens.extend(descriptions.iter().filter_map(Value::as_str).map(str::to_lowercase));
        }
        if tokens.iter().any(|t| t == "single") {
            return Some(ReleaseKind::Single);
        }
        if tokens.iter().any(|t| t == "ep") {
            return Some(ReleaseKind::Ep);
        }
    }
    Some(ReleaseKind::infer_from_track_count(track_count))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    release_title: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDetail {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    artists: Vec<DiscogsArtist>,
    #[serde(default)]
    tracklist: Vec<TracklistEntry>,
    #[serde(default)]
    formats: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct DiscogsArtist {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TracklistEntry {
    #[serde(rename = "type_", default)]
    entry_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_disc_track_position() {
        assert_eq!(parse_track_position(Some("1-3")), (Some(1), Some(3)));
    }

    #[test]
    fn parses_vinyl_side_position() {
        assert_eq!(parse_track_position(Some("B")), (None, Some(2)));
    }

    #[test]
    fn parses_plain_numeric_position() {
        assert_eq!(parse_track_position(Some("7")), (None, Some(7)));
    }

    #[test]
    fn parses_mmss_duration() {
        assert_eq!(parse_duration("3:45"), Some(225));
    }

    #[test]
    fn infers_ep_from_title_token() {
        let kind = infer_release_kind("Some EP", 4, &[]);
        assert_eq!(kind, Some(resonance_domain::ReleaseKind::Ep));
    }

    #[test]
    fn split_search_title_splits_on_dash() {
        let (artist, title) = split_search_title(Some("Bjork - Vespertine"));
        assert_eq!(artist.as_deref(), Some("Bjork"));
        assert_eq!(title.as_deref(), Some("Vespertine"));
    }
}
