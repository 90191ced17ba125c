//! Keyword extraction for the distributed inverted index (§4.9).

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

pub const MIN_KEYWORD_LENGTH: usize = 2;
pub const MAX_KEYWORDS_PER_DOC: usize = 50;

static STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "is", "it", "be", "as", "do", "by",
    "he", "we", "so", "if", "no", "up", "my", "me", "am", "us", "are", "was", "has", "had", "not", "all", "can",
    "her", "his", "its", "our", "you", "who", "how", "did", "get", "may", "new", "now", "old", "see", "way", "from",
    "with", "this", "that", "have", "will", "been", "each", "make", "like", "than", "them", "then", "into", "over",
    "such", "when", "very", "what", "just", "also", "more", "some", "only", "come", "could", "would", "about",
    "which", "their", "there", "these", "those", "other", "after", "being", "where", "does",
];

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z0-9]+\b").unwrap());

/// Extract indexable keywords from document text, ranked by frequency
/// (descending) and truncated to `max_keywords`.
#[must_use]
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut freq: HashMap<String, u32> = HashMap::new();

    for word in WORD_RE.find_iter(&lowered) {
        let word = word.as_str();
        if word.len() < MIN_KEYWORD_LENGTH || STOP_WORDS.contains(&word) {
            continue;
        }
        *freq.entry(word.to_owned()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, u32)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(max_keywords);
    ranked.into_iter().map(|(word, _)| word).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_keywords_sorted_by_frequency() {
        let text = "rust rust rust safety safety the and of";
        let keywords = extract_keywords(text, 50);
        assert_eq!(keywords[0], "rust");
        assert_eq!(keywords[1], "safety");
    }

    #[test]
    fn skips_stop_words_and_short_tokens() {
        let text = "a an to of is it be as a b";
        let keywords = extract_keywords(text, 50);
        assert!(keywords.is_empty());
    }

    #[test]
    fn truncates_to_max_keywords() {
        let text = (0..100).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let keywords = extract_keywords(&text, MAX_KEYWORDS_PER_DOC);
        assert_eq!(keywords.len(), MAX_KEYWORDS_PER_DOC);
    }
}
