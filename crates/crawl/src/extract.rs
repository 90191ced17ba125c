//! HTML extraction seam.
//!
//! The actual HTML → text/title/language extractor is an external
//! collaborator (e.g. a readability or trafilatura-style library) and is
//! out of scope here; callers inject an implementation of [`Extractor`].

/// Extracted content from a single fetched page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    pub text: String,
    pub language: Option<String>,
}

/// `extract(html, url) -> (title, text, language)` as an injectable
/// capability, matching §9's "Polymorphism" design note.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, url: &str) -> Option<ExtractedPage>;
}

/// Minimal fallback extractor used by tests and as a default when no
/// real extractor is wired in: strips tags crudely and takes the
/// `<title>` verbatim. Not suitable for production content quality.
#[derive(Default)]
pub struct NaiveExtractor;

impl Extractor for NaiveExtractor {
    fn extract(&self, html: &str, _url: &str) -> Option<ExtractedPage> {
        let title = extract_title(html).unwrap_or_default();
        let text = strip_tags(html);
        if text.trim().chars().count() < 50 {
            return None;
        }
        Some(ExtractedPage {
            title,
            text,
            language: None,
        })
    }
}

fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<title")?;
    let open_end = html[start..].find('>')? + start + 1;
    let close = lower[open_end..].find("</title>")? + open_end;
    Some(html[open_end..close].trim().to_owned())
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_extractor_rejects_short_text() {
        let extractor = NaiveExtractor;
        assert!(extractor.extract("<html><body>hi</body></html>", "u").is_none());
    }

    #[test]
    fn naive_extractor_pulls_title_and_text() {
        let html = "<html><head><title>Hello World</title></head><body>\
            This is a reasonably long paragraph of body text used only to satisfy \
            the minimum extracted length requirement for the naive extractor.\
            </body></html>";
        let extractor = NaiveExtractor;
        let page = extractor.extract(html, "u").expect("extracted");
        assert_eq!(page.title, "Hello World");
        assert!(page.text.contains("reasonably long paragraph"));
    }
}
