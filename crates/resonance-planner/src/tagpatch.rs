//! Tag-patch builder: computes the authoritative tag set for a resolved
//! release, preserving every other pre-existing tag untouched.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use resonance_domain::ProviderRelease;

use crate::planner::{Plan, SourceTrackFile};

/// Who produced the pinned decision being written into a tag patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Auto,
    User,
}

impl std::fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedBy::Auto => write!(f, "auto"),
            ResolvedBy::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileTagPatch {
    pub destination: PathBuf,
    /// Final tag set for this file: authoritative keys overriding any
    /// pre-existing tag of the same (case-insensitive) name, with every
    /// other pre-existing tag preserved unchanged.
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagPatch {
    pub files: Vec<FileTagPatch>,
}

const AUTHORITATIVE_KEYS: &[&str] = &[
    "album",
    "albumartist",
    "artist",
    "title",
    "tracknumber",
    "discnumber",
    "musicbrainz_albumid",
    "musicbrainz_recordingid",
    "date",
    "resonance.prov.pinned_release_id",
    "resonance.prov.resolved_by",
    "resonance.prov.resolved_at",
];

fn is_authoritative_key(key: &str) -> bool {
    AUTHORITATIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// Build the tag patch for an already-computed `Plan`.
///
/// `source_files` must be in the same order used to produce `plan.files`
/// (the Planner preserves this invariant); `existing_tags` gives each
/// file's pre-existing, case-preserved tag map, indexed the same way.
pub fn build_patch(
    plan: &Plan,
    source_files: &[SourceTrackFile],
    existing_tags: &[BTreeMap<String, String>],
    release: &ProviderRelease,
    album_title: &str,
    album_artist: &str,
    multi_disc: bool,
    resolved_by: ResolvedBy,
    now: DateTime<Utc>,
) -> TagPatch {
    let now_iso = now.to_rfc3339();

    let files = plan
        .files
        .iter()
        .zip(source_files)
        .enumerate()
        .map(|(index, (planned, source))| {
            let mut tags: BTreeMap<String, String> = existing_tags
                .get(index)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|(key, _)| !is_authoritative_key(key))
                .collect();

            tags.insert("album".to_string(), album_title.to_string());
            tags.insert("albumartist".to_string(), album_artist.to_string());
            tags.insert("artist".to_string(), release.artist.clone());
            tags.insert("title".to_string(), source.title.clone());
            tags.insert("tracknumber".to_string(), source.track_number.to_string());
            if multi_disc {
                if let Some(disc) = source.disc_number {
                    tags.insert("discnumber".to_string(), disc.to_string());
                }
            }
            if release.provider == "musicbrainz" {
                tags.insert("musicbrainz_albumid".to_string(), release.release_id.clone());
                if let Some(recording_id) = release.tracks.get(index).and_then(|t| t.recording_id.clone()) {
                    tags.insert("musicbrainz_recordingid".to_string(), recording_id);
                }
            }
            if let Some(year) = release.year {
                tags.insert("date".to_string(), year.to_string());
            }
            tags.insert("resonance.prov.pinned_release_id".to_string(), release.release_id.clone());
            tags.insert("resonance.prov.resolved_by".to_string(), resolved_by.to_string());
            tags.insert("resonance.prov.resolved_at".to_string(), now_iso.clone());

            FileTagPatch {
                destination: planned.destination.clone(),
                tags,
            }
        })
        .collect();

    TagPatch { files }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlannedFile;
    use resonance_domain::ProviderTrack;
    use std::path::PathBuf;

    fn basic_release() -> ProviderRelease {
        let mut track = ProviderTrack::new(1, "Unravel");
        track.recording_id = Some("rec-1".into());
        ProviderRelease {
            provider: "musicbrainz".to_string(),
            release_id: "mb-123".to_string(),
            title: "Vespertine".to_string(),
            artist: "Bjork".to_string(),
            tracks: vec![track],
            year: Some(2001),
            release_kind: None,
        }
    }

    #[test]
    fn preserves_unrelated_existing_tags() {
        let plan = Plan {
            dir_id: "dir1".to_string(),
            destination_root: PathBuf::from("/library/Bjork/2001 - Vespertine"),
            files: vec![PlannedFile {
                source: PathBuf::from("/src/01.flac"),
                destination: PathBuf::from("/library/Bjork/2001 - Vespertine/01 - Unravel.flac"),
            }],
        };
        let source = SourceTrackFile {
            path: PathBuf::from("/src/01.flac"),
            track_number: 1,
            disc_number: None,
            title: "Unravel".to_string(),
            extension: "flac".to_string(),
        };
        let mut existing = BTreeMap::new();
        existing.insert("genre".to_string(), "Electronic".to_string());
        existing.insert("comment".to_string(), "ripped in 2003".to_string());

        let patch = build_patch(
            &plan,
            &[source],
            &[existing],
            &basic_release(),
            "Vespertine",
            "Bjork",
            false,
            ResolvedBy::Auto,
            Utc::now(),
        );

        let tags = &patch.files[0].tags;
        assert_eq!(tags.get("genre").unwrap(), "Electronic");
        assert_eq!(tags.get("comment").unwrap(), "ripped in 2003");
        assert_eq!(tags.get("album").unwrap(), "Vespertine");
        assert_eq!(tags.get("musicbrainz_albumid").unwrap(), "mb-123");
        assert_eq!(tags.get("musicbrainz_recordingid").unwrap(), "rec-1");
        assert_eq!(tags.get("resonance.prov.pinned_release_id").unwrap(), "mb-123");
        assert_eq!(tags.get("resonance.prov.resolved_by").unwrap(), "auto");
    }

    #[test]
    fn non_musicbrainz_provider_omits_mb_tags() {
        let mut release = basic_release();
        release.provider = "discogs".to_string();
        release.release_id = "dg-1".to_string();

        let plan = Plan {
            dir_id: "dir1".to_string(),
            destination_root: PathBuf::from("/library/Bjork/2001 - Vespertine"),
            files: vec![PlannedFile {
                source: PathBuf::from("/src/01.flac"),
                destination: PathBuf::from("/library/Bjork/2001 - Vespertine/01 - Unravel.flac"),
            }],
        };
        let source = SourceTrackFile {
            path: PathBuf::from("/src/01.flac"),
            track_number: 1,
            disc_number: None,
            title: "Unravel".to_string(),
            extension: "flac".to_string(),
        };

        let patch = build_patch(&plan, &[source], &[BTreeMap::new()], &release, "Vespertine", "Bjork", false, ResolvedBy::User, Utc::now());
        assert!(!patch.files[0].tags.contains_key("musicbrainz_albumid"));
        assert_eq!(patch.files[0].tags.get("resonance.prov.pinned_release_id").unwrap(), "dg-1");
    }
}
