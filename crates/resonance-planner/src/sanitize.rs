//! Path-segment sanitization shared by directory and filename components.
//!
//! Rules (applied in order): Unicode NFC normalize; replace path separators
//! with `" - "`; strip control characters; collapse runs of spaces; trim
//! trailing dots and spaces; cap segment length at 200 UTF-8 bytes; reject
//! reserved Windows device names.

use unicode_normalization::UnicodeNormalization;

const MAX_SEGMENT_BYTES: usize = 200;

const RESERVED_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

pub fn sanitize_segment(raw: &str) -> String {
    let normalized: String = raw.nfc().collect();
    let separators_replaced = normalized.replace(['/', '\\'], " - ");
    let no_control: String = separators_replaced.chars().filter(|c| !c.is_control()).collect();
    let collapsed = collapse_spaces(&no_control);
    let trimmed = collapsed.trim_end_matches(['.', ' ']).trim_start();
    let capped = cap_to_byte_len(trimmed, MAX_SEGMENT_BYTES);
    guard_reserved_name(&capped)
}

fn collapse_spaces(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for c in input.chars() {
        if c == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

fn cap_to_byte_len(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    input[..end].trim_end_matches(['.', ' ']).to_string()
}

fn guard_reserved_name(segment: &str) -> String {
    let stem = segment.split('.').next().unwrap_or(segment);
    if RESERVED_WINDOWS_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        format!("_{segment}")
    } else {
        segment.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_path_separators() {
        assert_eq!(sanitize_segment("AC/DC"), "AC - DC");
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(sanitize_segment("Track\u{0007}Name"), "TrackName");
    }

    #[test]
    fn collapses_runs_of_spaces() {
        assert_eq!(sanitize_segment("Too    Many   Spaces"), "Too Many Spaces");
    }

    #[test]
    fn trims_trailing_dots_and_spaces() {
        assert_eq!(sanitize_segment("Album Title... "), "Album Title");
    }

    #[test]
    fn caps_segment_length() {
        let long = "a".repeat(300);
        let result = sanitize_segment(&long);
        assert!(result.len() <= MAX_SEGMENT_BYTES);
    }

    #[test]
    fn rejects_reserved_windows_names() {
        assert_eq!(sanitize_segment("CON"), "_CON");
        assert_eq!(sanitize_segment("con.txt"), "_con.txt");
        assert_eq!(sanitize_segment("Console"), "Console");
    }
}
