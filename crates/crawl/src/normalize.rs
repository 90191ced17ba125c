//! Canonical URL form used as the dedup identity key (§3 "URL").

use url::Url;

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "source",
    "mc_cid",
    "mc_eid",
];

/// Normalize `url` to its canonical dedup form: lowercase scheme/host,
/// fragment stripped, tracking parameters removed, remaining query
/// parameters sorted, trailing slash removed unless the path is `/`.
///
/// Returns the original string unchanged if it does not parse as a URL —
/// callers should already have run [`infomesh_ssrf::validate`] by then.
#[must_use]
pub fn normalize(input: &str) -> String {
    let Ok(mut parsed) = Url::parse(input) else {
        return input.to_owned();
    };

    let _ = parsed.set_scheme(&parsed.scheme().to_ascii_lowercase());
    if let Some(host) = parsed.host_str() {
        let lowered = host.to_ascii_lowercase();
        let _ = parsed.set_host(Some(&lowered));
    }
    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        parsed.set_query(Some(&serializer.finish()));
    }

    let path = parsed.path().to_owned();
    if path != "/" && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_owned();
        parsed.set_path(&trimmed);
    }

    parsed.into()
}

#[cfg(test)]
mod tests {
    use super::normalize;

    #[test]
    fn strips_tracking_params_and_fragment() {
        let input = "https://Example.COM/a/b/?utm_source=x&q=hi#frag";
        assert_eq!(normalize(input), "https://example.com/a/b?q=hi");
    }

    #[test]
    fn idempotent() {
        let input = "https://Example.COM/a/b/?utm_source=x&q=hi#frag";
        let once = normalize(input);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn preserves_root_path() {
        assert_eq!(normalize("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn sorts_remaining_query_params() {
        assert_eq!(
            normalize("https://example.com/?b=2&a=1"),
            "https://example.com/?a=1&b=2"
        );
    }
}
