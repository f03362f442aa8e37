//! MIME type detection from file content.

/// How many leading bytes backends fetch for detection.
pub(crate) const SNIFF_LEN: u64 = 3072;

const OCTET_STREAM: &str = "application/octet-stream";

/// Detect a MIME type from the first bytes of a file.
///
/// Magic numbers first, then a UTF-8 text heuristic. Returns `None` when the
/// content is not recognizable, so callers can fall back to server-reported
/// or extension-derived types.
pub(crate) fn detect(head: &[u8]) -> Option<String> {
    if let Some(kind) = infer::get(head) {
        return Some(kind.mime_type().to_string());
    }
    if looks_like_text(head) {
        return Some("text/plain".to_string());
    }
    None
}

/// Detect from content, falling back to the file extension.
pub(crate) fn detect_or_guess(head: &[u8], file_name: &str) -> String {
    detect(head).unwrap_or_else(|| {
        mime_guess::from_path(file_name)
            .first_raw()
            .map(strip_params)
            .unwrap_or_else(|| OCTET_STREAM.to_string())
    })
}

/// Drop any `; charset=...` style parameters.
pub(crate) fn strip_params(mime: &str) -> String {
    mime.split(';').next().unwrap_or(mime).trim().to_string()
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A sniff window may end mid-codepoint; only the tail may be invalid.
        Err(err) => err.error_len().is_none(),
    }
}
