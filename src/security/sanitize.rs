//! Input sanitization for text that ends up in markup or on disk.
//!
//! Pure string functions. The JSON entry points cover catalog data that
//! arrives untyped, where a non-string value gets a fixed fallback.

use serde_json::Value;

/// Tags longer than this (after escaping) are dropped.
pub const MAX_TAG_LEN: usize = 50;

/// At most this many tags are kept.
pub const MAX_TAGS: usize = 20;

/// File names are cut to this many characters.
pub const MAX_FILE_NAME_LEN: usize = 200;

/// Name used when a file name is missing or empty.
pub const DEFAULT_FILE_NAME: &str = "unnamed";

/// Entities emitted by [`sanitize_text`]. An `&` that already starts one of
/// these is left alone, which keeps the function idempotent.
const ENTITIES: [&str; 5] = ["&amp;", "&lt;", "&gt;", "&quot;", "&#39;"];

/// Entity-encode `&`, `<`, `>`, `"` and `'`.
pub fn sanitize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, c) in input.char_indices() {
        match c {
            '&' if ENTITIES.iter().any(|e| input[i..].starts_with(e)) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Trim and escape each tag, drop empty or over-long ones, keep the first
/// [`MAX_TAGS`] in order.
pub fn sanitize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    tags.iter()
        .map(|tag| sanitize_text(tag.as_ref().trim()))
        .filter(|tag| !tag.is_empty() && tag.chars().count() <= MAX_TAG_LEN)
        .take(MAX_TAGS)
        .collect()
}

/// Replace path separators, control characters and characters that are
/// unsafe on common filesystems or shells with `_`, then truncate.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if is_unsafe_in_file_name(c) { '_' } else { c })
        .take(MAX_FILE_NAME_LEN)
        .collect();
    if cleaned.is_empty() {
        DEFAULT_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

fn is_unsafe_in_file_name(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_ascii_control()
}

/// [`sanitize_text`] for untyped input; non-strings become `""`.
pub fn sanitize_json_text(value: &Value) -> String {
    value.as_str().map(sanitize_text).unwrap_or_default()
}

/// [`sanitize_tags`] for untyped input; non-arrays become `[]` and
/// non-string items are skipped.
pub fn sanitize_json_tags(value: &Value) -> Vec<String> {
    match value.as_array() {
        Some(items) => {
            let strings: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            sanitize_tags(&strings)
        }
        None => Vec::new(),
    }
}

/// [`sanitize_file_name`] for untyped input; non-strings become
/// [`DEFAULT_FILE_NAME`].
pub fn sanitize_json_file_name(value: &Value) -> String {
    match value.as_str() {
        Some(name) => sanitize_file_name(name),
        None => DEFAULT_FILE_NAME.to_string(),
    }
}
