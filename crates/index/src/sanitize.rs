//! FTS5 query sanitization, applied before every search (§4.7).

const MAX_QUERY_LEN: usize = 1000;
const METACHARS: &[char] = &['"', '(', ')', '{', '}', '*', '^', ':'];
const BOOLEAN_OPERATORS: &[&str] = &["AND", "OR", "NOT", "NEAR"];

/// Sanitize a raw user query for safe use against an FTS5 `MATCH` clause:
/// truncates, strips metacharacters and whole-word boolean/proximity
/// operators, collapses whitespace, and falls back to an alphanumeric
/// fragment (or the literal `infomesh`) if the result would be empty.
#[must_use]
pub fn sanitize_query(raw: &str) -> String {
    let truncated: String = raw.chars().take(MAX_QUERY_LEN).collect();

    let stripped: String = truncated
        .chars()
        .filter(|c| !METACHARS.contains(c))
        .collect();

    let without_operators: String = stripped
        .split_whitespace()
        .filter(|word| !BOOLEAN_OPERATORS.contains(&word.to_ascii_uppercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ");

    let collapsed = without_operators.trim().to_owned();

    if collapsed.is_empty() {
        let alnum: String = raw.chars().filter(|c| c.is_alphanumeric()).collect();
        if alnum.is_empty() {
            "infomesh".to_owned()
        } else {
            alnum
        }
    } else {
        collapsed
    }
}
