//! Per-track filename template.

use crate::sanitize::sanitize_segment;

/// Build a destination filename: `<DD>[-<DD>] - <Title>.<ext>` when the
/// release is multi-disc (disc number present and > 1 disc total known by
/// the caller), else `<DD> - <Title>.<ext>`.
pub fn build_filename(track_number: u32, disc_number: Option<u32>, multi_disc: bool, title: &str, extension: &str) -> String {
    let number_part = match (multi_disc, disc_number) {
        (true, Some(disc)) => format!("{disc:02}-{track_number:02}"),
        _ => format!("{track_number:02}"),
    };
    let raw = format!("{number_part} - {title}.{extension}");
    sanitize_segment(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_disc_filename() {
        assert_eq!(build_filename(3, None, false, "Unravel", "flac"), "03 - Unravel.flac");
    }

    #[test]
    fn multi_disc_filename_includes_disc_number() {
        assert_eq!(build_filename(3, Some(2), true, "Unravel", "flac"), "02-03 - Unravel.flac");
    }

    #[test]
    fn sanitizes_title_within_filename() {
        let name = build_filename(1, None, false, "AC/DC Tribute", "mp3");
        assert_eq!(name, "01 - AC - DC Tribute.mp3");
    }
}
