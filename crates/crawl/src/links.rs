//! Outbound link extraction (§4.5).

use std::collections::HashSet;

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a\s[^>]*href=["']([^"'#][^"']*)["']"#).expect("valid regex"));

const SKIP_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".mp3", ".mp4", ".avi", ".mov",
    ".zip", ".tar", ".gz", ".exe", ".dmg", ".iso", ".css", ".js", ".woff", ".woff2",
];

/// Extract deduplicated absolute http(s) links from `html`, resolved
/// against `base_url`. Drops anchors, mailto/js/tel/data schemes, and
/// binary file extensions; strips fragments.
#[must_use]
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for caps in HREF_RE.captures_iter(html) {
        let href = caps[1].trim();
        let lower = href.to_ascii_lowercase();
        if lower.starts_with("mailto:")
            || lower.starts_with("javascript:")
            || lower.starts_with("tel:")
            || lower.starts_with("data:")
        {
            continue;
        }

        let Ok(mut absolute) = base.join(href) else {
            continue;
        };
        if absolute.scheme() != "http" && absolute.scheme() != "https" {
            continue;
        }

        let path_lower = absolute.path().to_ascii_lowercase();
        if SKIP_EXTENSIONS.iter().any(|ext| path_lower.ends_with(ext)) {
            continue;
        }

        absolute.set_fragment(None);
        let clean: String = absolute.into();
        if seen.insert(clean.clone()) {
            links.push(clean);
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_dedupes_http_links() {
        let html = r#"<a href="/a">a</a><a href="/a">dup</a><a href="https://other.example/b">b</a>"#;
        let links = extract_links(html, "https://example.com/page");
        assert_eq!(links.len(), 2);
        assert!(links.contains(&"https://example.com/a".to_owned()));
        assert!(links.contains(&"https://other.example/b".to_owned()));
    }

    #[test]
    fn skips_non_http_and_binary_extensions() {
        let html = r#"<a href="mailto:a@b.com">m</a><a href="/file.pdf">pdf</a><a href="javascript:void(0)">j</a>"#;
        let links = extract_links(html, "https://example.com/page");
        assert!(links.is_empty());
    }

    #[test]
    fn strips_fragment() {
        let html = r#"<a href="/a#section">a</a>"#;
        let links = extract_links(html, "https://example.com/page");
        assert_eq!(links, vec!["https://example.com/a".to_owned()]);
    }
}
