use unicode_normalization::UnicodeNormalization;

pub fn clean_text(raw: &str) -> String {
    let normalized: String = raw
        .nfkc()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max` characters. Never splits a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

pub fn bounded(raw: &str, max: usize) -> Option<String> {
    let cleaned = clean_text(raw);
    if cleaned.is_empty() {
        return None;
    }
    Some(truncate_chars(&cleaned, max))
}
