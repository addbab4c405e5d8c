//! Destination layout computation: classical / compilation / regular
//! branching, ported from the canonical directory-layout algorithm.

use std::path::PathBuf;

use crate::canon::{NameCanonicalizer, NameCategory};
use crate::sanitize::sanitize_segment;

#[derive(Debug, Clone)]
pub struct LayoutInput<'a> {
    pub album_title: Option<&'a str>,
    pub artist: Option<&'a str>,
    pub composer: Option<&'a str>,
    pub performer: Option<&'a str>,
    pub is_classical: bool,
    pub is_compilation: bool,
    pub year: Option<i32>,
    pub include_year: bool,
    pub include_performer_subdir: bool,
}

fn apply_component(
    value: Option<&str>,
    category: NameCategory,
    canonicalizer: &dyn NameCanonicalizer,
) -> Option<String> {
    let value = value?;
    if value.is_empty() {
        return None;
    }
    let display = canonicalizer.canonicalize(value, category);
    let cleaned = sanitize_segment(&display);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn build_album_folder(title: Option<&str>, year: Option<i32>, include_year: bool) -> Option<String> {
    let title = title?;
    if title.is_empty() {
        return None;
    }
    if include_year {
        let year_str = year.map(|y| format!("{y:04}")).unwrap_or_else(|| "0000".to_string());
        Some(sanitize_segment(&format!("{year_str} - {title}")))
    } else {
        Some(sanitize_segment(title))
    }
}

/// Compute the destination directory for an album given normalized display
/// components. Returns `None` when there isn't enough information to place
/// it (e.g. no artist and no album title for a regular release).
pub fn compute_destination_path(input: &LayoutInput<'_>, canonicalizer: &dyn NameCanonicalizer) -> Option<PathBuf> {
    let album_folder = build_album_folder(input.album_title, input.year, input.include_year);
    let artist_value = apply_component(input.artist, NameCategory::Artist, canonicalizer);
    let composer_value = apply_component(input.composer, NameCategory::Composer, canonicalizer);
    let performer_value = apply_component(input.performer, NameCategory::Performer, canonicalizer);
    let various_artists = apply_component(Some("Various Artists"), NameCategory::Artist, canonicalizer);

    if input.is_compilation {
        let album_folder = album_folder?;
        let various_artists = various_artists?;
        return Some(PathBuf::from(various_artists).join(album_folder));
    }

    if input.is_classical {
        if let Some(composer) = composer_value {
            return Some(match (&album_folder, input.include_performer_subdir, &performer_value) {
                (Some(album), true, Some(performer)) => PathBuf::from(&composer).join(album).join(performer),
                (Some(album), _, _) => PathBuf::from(&composer).join(album),
                (None, _, _) => PathBuf::from(&composer),
            });
        }
        if let Some(performer) = performer_value {
            return Some(match &album_folder {
                Some(album) => PathBuf::from(&performer).join(album),
                None => PathBuf::from(&performer),
            });
        }
        if let (Some(album), Some(various)) = (&album_folder, &various_artists) {
            return Some(PathBuf::from(various).join(album));
        }
        return None;
    }

    match (artist_value, album_folder) {
        (Some(artist), Some(album)) => Some(PathBuf::from(artist).join(album)),
        _ => None,
    }
}
