//! Small helpers shared by adapters. Grounded on the teacher's
//! `channels::base::split_message`.

/// Splits `text` into chunks no longer than `limit` characters, preferring
/// to break on a blank line, then a single newline, then a hard UTF-8-safe
/// cut. Each chunk is trimmed.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.trim().to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > limit {
        let byte_limit = char_boundary_at(remaining, limit);
        let window = &remaining[..byte_limit];

        let split_at = window
            .rfind("\n\n")
            .map(|i| i + 2)
            .or_else(|| window.rfind('\n').map(|i| i + 1))
            .unwrap_or(byte_limit);

        let (chunk, rest) = remaining.split_at(split_at.max(1));
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        remaining = rest;
    }

    let trimmed = remaining.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    chunks
}

fn char_boundary_at(s: &str, max_chars: usize) -> usize {
    s.char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(split_message("hello", 100), vec!["hello".to_string()]);
    }

    #[test]
    fn long_text_splits_on_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(10), "b".repeat(10));
        let chunks = split_message(&text, 15);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(10));
        assert_eq!(chunks[1], "b".repeat(10));
    }

    #[test]
    fn hard_cut_respects_utf8_boundaries() {
        let text = "é".repeat(20);
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }
}
