//! Optional name canonicalization, consulted before sanitizing each display
//! component. Purely additive: the default implementation is a no-op, so
//! omitting a canonicalizer never changes destination-path correctness.

/// One of the categories a display name can belong to, matching the
/// categories the identity canonicalizer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameCategory {
    Artist,
    Composer,
    Performer,
    AlbumArtist,
    Conductor,
}

pub trait NameCanonicalizer: Send + Sync {
    /// Return the canonical display form of `name`, or `name` unchanged if
    /// no mapping is known.
    fn canonicalize(&self, name: &str, category: NameCategory) -> String;

    /// Canonicalize a possibly multi-name string (split on `;` or `,`,
    /// deduped case-insensitively, always rejoined on `"; "` — never a comma).
    fn canonicalize_multi(&self, names: &str, category: NameCategory) -> String {
        if names.is_empty() {
            return names.to_string();
        }

        let parts: Vec<&str> = if names.contains(';') {
            names.split(';').map(str::trim).filter(|s| !s.is_empty()).collect()
        } else if names.contains(',') {
            names.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
        } else {
            vec![names.trim()]
        };

        let mut seen = std::collections::HashSet::new();
        let mut canonical_parts = Vec::new();
        for part in parts {
            let canonical = self.canonicalize(part, category);
            let lower = canonical.to_lowercase();
            if seen.insert(lower) {
                canonical_parts.push(canonical);
            }
        }

        if canonical_parts.is_empty() {
            names.to_string()
        } else {
            canonical_parts.join("; ")
        }
    }
}

/// Default canonicalizer: every name passes through unchanged.
pub struct NoopCanonicalizer;

impl NameCanonicalizer for NoopCanonicalizer {
    fn canonicalize(&self, name: &str, _category: NameCategory) -> String {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapCanonicalizer(HashMap<String, String>);

    impl NameCanonicalizer for MapCanonicalizer {
        fn canonicalize(&self, name: &str, _category: NameCategory) -> String {
            self.0.get(&name.to_lowercase()).cloned().unwrap_or_else(|| name.to_string())
        }
    }

    #[test]
    fn noop_canonicalizer_passes_through() {
        let c = NoopCanonicalizer;
        assert_eq!(c.canonicalize("Bjork", NameCategory::Artist), "Bjork");
    }

    #[test]
    fn canonicalize_multi_joins_on_semicolon_never_comma() {
        let mut map = HashMap::new();
        map.insert("bjork".to_string(), "Björk".to_string());
        let c = MapCanonicalizer(map);
        let out = c.canonicalize_multi("Bjork, Bjork; bjork", NameCategory::Artist);
        assert_eq!(out, "Björk");
    }
}
