//! Extension → MIME type classification

use std::path::Path;

pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Classifies a path by its extension using mime_guess's static table.
/// Unknown or missing extensions map to `FALLBACK_MIME`.
pub fn mime_for_path(path: &Path) -> &'static str {
    mime_guess::from_path(path).first_raw().unwrap_or(FALLBACK_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(mime_for_path(Path::new("/a/photo.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("/a/photo.jpg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("notes.txt")), "text/plain");
        assert_eq!(mime_for_path(Path::new("/x/report.pdf")), "application/pdf");
    }

    #[test]
    fn test_unknown_or_missing_extension_is_binary() {
        assert_eq!(mime_for_path(Path::new("/a/blob.qqzzx")), FALLBACK_MIME);
        assert_eq!(mime_for_path(Path::new("/a/Makefile")), FALLBACK_MIME);
    }
}
