//! Bounded copies of diagnostic text for error messages and task records.

/// Longest prefix of a response body or transport error that is kept
pub const MESSAGE_LIMIT: usize = 200;

/// Longest suffix of encoder diagnostics that is kept
pub const STDERR_TAIL_LIMIT: usize = 400;

/// First `max` characters of `text`
pub fn head(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Last `max` characters of `text`
pub fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    match text.char_indices().nth(count - max) {
        Some((idx, _)) => text[idx..].to_string(),
        None => String::new(),
    }
}
