//! Human-facing data-quality signals: freshness labels, trust grades,
//! and citation extraction from document text. Supplements the raw
//! [`crate::score`] signals with presentation-ready metadata.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FreshnessIndicator {
    pub crawled_at: f64,
    pub age_seconds: f64,
    pub age_label: String,
    pub freshness_grade: char,
}

#[must_use]
pub fn compute_freshness_indicator(crawled_at: f64, now: f64) -> FreshnessIndicator {
    let age = (now - crawled_at).max(0.0);

    let age_label = if age < 60.0 {
        "just now".to_owned()
    } else if age < 3600.0 {
        plural_label(age / 60.0, "minute")
    } else if age < 86_400.0 {
        plural_label(age / 3600.0, "hour")
    } else if age < 604_800.0 {
        plural_label(age / 86_400.0, "day")
    } else if age < 2_592_000.0 {
        plural_label(age / 604_800.0, "week")
    } else {
        plural_label(age / 2_592_000.0, "month")
    };

    let freshness_grade = if age < 86_400.0 {
        'A'
    } else if age < 604_800.0 {
        'B'
    } else if age < 2_592_000.0 {
        'C'
    } else if age < 7_776_000.0 {
        'D'
    } else {
        'F'
    };

    FreshnessIndicator {
        crawled_at,
        age_seconds: age,
        age_label,
        freshness_grade,
    }
}

fn plural_label(value: f64, unit: &str) -> String {
    let count = value as i64;
    if count == 1 {
        format!("{count} {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrustGrade {
    pub score: f64,
    pub grade: &'static str,
    pub label: &'static str,
    pub color: &'static str,
}

#[must_use]
pub fn compute_trust_grade(trust_score: f64) -> TrustGrade {
    let (grade, label, color) = if trust_score >= 0.9 {
        ("A+", "Highly Trusted", "green")
    } else if trust_score >= 0.8 {
        ("A", "Trusted", "green")
    } else if trust_score >= 0.65 {
        ("B", "Reliable", "blue")
    } else if trust_score >= 0.5 {
        ("C", "Moderate", "yellow")
    } else if trust_score >= 0.3 {
        ("D", "Low Trust", "orange")
    } else {
        ("F", "Untrusted", "red")
    };
    TrustGrade { score: trust_score, grade, label, color }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CitationType {
    Url,
    Doi,
    Isbn,
    Arxiv,
    Rfc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub text: String,
    pub citation_type: CitationType,
    pub identifier: String,
    pub context: String,
}

static DOI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(10\.\d{4,}/\S+)\b").unwrap());
static ISBN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:978|979)[-\s]?\d[-\s]?\d{2,7}[-\s]?\d{1,7}[-\s]?\d)\b").unwrap());
static ARXIV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b((?:arXiv:)?\d{4}\.\d{4,5}(?:v\d+)?)\b").unwrap());
static RFC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(RFC\s*\d{1,5})\b").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(https?://[^\s<>"')\]]+)"#).unwrap());

/// Extract URL/DOI/ISBN/arXiv/RFC citations from free text, in that
/// pattern order, deduplicating by identifier.
#[must_use]
pub fn extract_citations(text: &str) -> Vec<Citation> {
    let mut citations = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let patterns: &[(&LazyLock<Regex>, CitationType)] = &[
        (&DOI_RE, CitationType::Doi),
        (&ISBN_RE, CitationType::Isbn),
        (&ARXIV_RE, CitationType::Arxiv),
        (&RFC_RE, CitationType::Rfc),
        (&URL_RE, CitationType::Url),
    ];

    for (pattern, ctype) in patterns {
        for m in pattern.captures_iter(text) {
            let full = m.get(0).unwrap();
            let identifier = m.get(1).unwrap().as_str().trim().to_owned();
            if !seen.insert(identifier.clone()) {
                continue;
            }
            let start = full.start().saturating_sub(50);
            let end = (full.end() + 50).min(text.len());
            let context = text[start..end].trim().to_owned();
            citations.push(Citation {
                text: full.as_str().to_owned(),
                citation_type: ctype.clone(),
                identifier,
                context,
            });
        }
    }

    citations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_indicator_grades_recent_documents_a() {
        let now = 1_000_000.0;
        let indicator = compute_freshness_indicator(now - 3600.0, now);
        assert_eq!(indicator.freshness_grade, 'A');
        assert_eq!(indicator.age_label, "1 hour ago");
    }

    #[test]
    fn freshness_indicator_labels_just_now() {
        let now = 1_000_000.0;
        let indicator = compute_freshness_indicator(now - 5.0, now);
        assert_eq!(indicator.age_label, "just now");
    }

    #[test]
    fn trust_grade_boundaries() {
        assert_eq!(compute_trust_grade(0.95).grade, "A+");
        assert_eq!(compute_trust_grade(0.4).grade, "D");
        assert_eq!(compute_trust_grade(0.1).grade, "F");
    }

    #[test]
    fn extract_citations_finds_doi_and_url() {
        let text = "See https://example.com/paper and doi 10.1000/xyz123 for details.";
        let citations = extract_citations(text);
        assert!(citations.iter().any(|c| c.citation_type == CitationType::Url));
        assert!(citations.iter().any(|c| c.citation_type == CitationType::Doi));
    }

    #[test]
    fn extract_citations_deduplicates_identical_identifiers() {
        let text = "https://example.com/a appears twice: https://example.com/a";
        let citations = extract_citations(text);
        assert_eq!(citations.iter().filter(|c| c.identifier == "https://example.com/a").count(), 1);
    }
}
