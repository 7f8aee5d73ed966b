//! Keyword matching over lowercase chat text.

/// Keywords up to this many characters only match as whole words.
const SHORT_KEYWORD_CHARS: usize = 3;

/// Whether `text` (already lowercase) mentions `keyword`.
///
/// Short keywords such as `pt`, `no` or `run` match on word boundaries so that
/// "except" does not route to the physio and "know" is not a refusal. Longer
/// keywords match anywhere, which keeps stems like `frustrat` useful.
pub fn mentions(text: &str, keyword: &str) -> bool {
    let is_short = keyword.chars().count() <= SHORT_KEYWORD_CHARS
        && keyword.chars().all(char::is_alphanumeric);
    if !is_short {
        return text.contains(keyword);
    }
    text.match_indices(keyword).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

/// Whether `text` mentions any of `keywords`.
pub fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| mentions(text, keyword))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut.
pub fn clip(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
