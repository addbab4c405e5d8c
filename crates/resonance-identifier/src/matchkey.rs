//! Name normalization used for provider dedup keys.
//!
//! `normalize_token` strips diacritics, drops featuring-artist suffixes, and
//! keeps only lowercase alphanumerics — "Sigur Rós" and "Daft Punk feat.
//! Pharrell Williams" normalize to `sigurros` and `daftpunk` respectively.

use unicode_normalization::UnicodeNormalization;

const FEATURING_MARKERS: &[&str] = &[" feat. ", " feat ", " featuring "];

pub fn normalize_token(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mut truncated = lower.as_str();
    for marker in FEATURING_MARKERS {
        if let Some(idx) = truncated.find(marker) {
            truncated = &truncated[..idx];
            break;
        }
    }

    truncated
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F)
}

fn key_or_none(token: String) -> Option<String> {
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

pub fn match_key_artist(name: &str) -> Option<String> {
    key_or_none(normalize_token(name))
}

pub fn match_key_album(title: &str) -> Option<String> {
    key_or_none(normalize_token(title))
}

pub fn match_key_work(title: &str) -> Option<String> {
    key_or_none(normalize_token(title))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_token_common_variants() {
        assert_eq!(normalize_token("Björk"), "bjork");
        assert_eq!(normalize_token("Sigur Rós"), "sigurros");
        assert_eq!(normalize_token("  The Beatles  "), "thebeatles");
        assert_eq!(normalize_token("Daft Punk feat. Pharrell Williams"), "daftpunk");
        assert_eq!(normalize_token("Daft Punk featuring Pharrell Williams"), "daftpunk");
        assert_eq!(normalize_token("AC/DC"), "acdc");
        assert_eq!(normalize_token("Guns N' Roses"), "gunsnroses");
        assert_eq!(normalize_token(""), "");
    }

    #[test]
    fn normalize_token_is_idempotent() {
        let once = normalize_token("Björk");
        let twice = normalize_token(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn match_key_returns_none_for_empty_token() {
        assert_eq!(match_key_artist(""), None);
        assert_eq!(match_key_artist("   "), None);
    }
}
