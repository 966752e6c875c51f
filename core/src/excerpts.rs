//! UTF-8 safe slicing and truncation helpers
//!
//! Shared between the unitizer (clamping chunks to `[min_chars, max_chars]`)
//! and the Spectral Context Compiler (truncating the assembled state message
//! to `max_state_chars`). Both need to cut text without landing mid
//! multi-byte character.

/// Find valid UTF-8 char boundaries for a byte range, clamped to `text`'s length.
/// Returns `(slice, actual_start, actual_end)`.
pub fn safe_utf8_slice(text: &str, start: usize, limit: usize) -> (String, usize, usize) {
    let bytes = text.as_bytes();
    let len = bytes.len();

    if start >= len {
        return (String::new(), len, len);
    }

    let mut actual_start = start.min(len);
    while actual_start < len && !text.is_char_boundary(actual_start) {
        actual_start += 1;
    }

    let mut actual_end = (actual_start + limit).min(len);
    while actual_end > actual_start && !text.is_char_boundary(actual_end) {
        actual_end -= 1;
    }

    let content = text[actual_start..actual_end].to_string();
    (content, actual_start, actual_end)
}

/// Truncate `text` to at most `max_chars` characters, appending an ellipsis
/// marker when truncation actually happened. Operates on `char` boundaries
/// (not bytes), so it never splits a multi-byte character.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{head}…")
}

/// Split `text` into non-overlapping windows of at most `max_chars` characters.
/// Used by the unitizer when a chunk exceeds `max_chars` and must be split
/// rather than dropped.
pub fn char_windows(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}
