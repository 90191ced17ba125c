//! Conditional-GET recrawl with adaptive change-frequency learning (§4.6).

use std::time::{Duration, Instant};

use infomesh_primitives::hash::sha256_hex;
use infomesh_ssrf::validate;

use crate::extract::Extractor;
use crate::worker::MAX_RESPONSE_BYTES;

const INTERVAL_HIGH: u64 = 6 * 3600;
const INTERVAL_MEDIUM: u64 = 24 * 3600;
const INTERVAL_LOW: u64 = 7 * 24 * 3600;
const INTERVAL_STATIC: u64 = 30 * 24 * 3600;

/// Number of consecutive failures before a candidate is soft-deleted.
pub const STALE_THRESHOLD: u32 = 3;

/// Compute the recrawl interval, in seconds, from an observed change
/// frequency in `[0, 1]`.
#[must_use]
pub fn compute_recrawl_interval(change_frequency: f64) -> u64 {
    if change_frequency <= 0.0 {
        INTERVAL_STATIC
    } else if change_frequency < 0.10 {
        INTERVAL_LOW
    } else if change_frequency <= 0.50 {
        INTERVAL_MEDIUM
    } else {
        INTERVAL_HIGH
    }
}

/// Exponential moving average update of the per-document change frequency.
#[must_use]
pub fn update_change_frequency(old_freq: f64, changed: bool, alpha: f64) -> f64 {
    let observed = if changed { 1.0 } else { 0.0 };
    alpha.mul_add(observed, (1.0 - alpha) * old_freq)
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecrawlStatus {
    NotModified,
    Updated,
    Deleted,
    Error,
}

#[derive(Clone, Debug, Default)]
pub struct RecrawlCandidate {
    pub doc_id: i64,
    pub url: String,
    pub text_hash: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub recrawl_interval_secs: u64,
    pub stale_count: u32,
    pub crawled_at: f64,
    pub last_recrawl_at: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct RecrawlOutcome {
    pub url: String,
    pub status: RecrawlStatus,
    pub new_text_hash: Option<String>,
    pub new_etag: Option<String>,
    pub new_last_modified: Option<String>,
    pub stale_count: u32,
    pub elapsed_ms: f64,
}

/// Re-crawl a single URL with conditional-GET headers where available.
pub async fn recrawl_url(
    client: &reqwest::Client,
    extractor: &dyn Extractor,
    url: &str,
    etag: Option<&str>,
    last_modified: Option<&str>,
    old_text_hash: &str,
    stale_count: u32,
) -> RecrawlOutcome {
    let start = Instant::now();

    if validate(url).is_err() {
        return RecrawlOutcome {
            url: url.to_owned(),
            status: RecrawlStatus::Error,
            new_text_hash: None,
            new_etag: None,
            new_last_modified: None,
            stale_count,
            elapsed_ms: elapsed_ms(start),
        };
    }

    let mut request = client.get(url).timeout(Duration::from_secs(30));
    if let Some(etag) = etag {
        request = request.header(reqwest::header::IF_NONE_MATCH, etag);
    }
    if let Some(last_modified) = last_modified {
        request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(_) => {
            return RecrawlOutcome {
                url: url.to_owned(),
                status: RecrawlStatus::Error,
                new_text_hash: None,
                new_etag: None,
                new_last_modified: None,
                stale_count: stale_count + 1,
                elapsed_ms: elapsed_ms(start),
            };
        }
    };

    if response.status().as_u16() == 304 {
        return RecrawlOutcome {
            url: url.to_owned(),
            status: RecrawlStatus::NotModified,
            new_text_hash: None,
            new_etag: etag.map(str::to_owned),
            new_last_modified: last_modified.map(str::to_owned),
            stale_count: 0,
            elapsed_ms: elapsed_ms(start),
        };
    }

    if response.status().as_u16() >= 400 {
        let new_stale = stale_count + 1;
        let status = if new_stale >= STALE_THRESHOLD {
            RecrawlStatus::Deleted
        } else {
            RecrawlStatus::Error
        };
        return RecrawlOutcome {
            url: url.to_owned(),
            status,
            new_text_hash: None,
            new_etag: None,
            new_last_modified: None,
            stale_count: new_stale,
            elapsed_ms: elapsed_ms(start),
        };
    }

    let new_etag = response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let new_last_modified = response
        .headers()
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let body = match response.text().await {
        Ok(b) if b.len() <= MAX_RESPONSE_BYTES => b,
        _ => {
            return RecrawlOutcome {
                url: url.to_owned(),
                status: RecrawlStatus::Error,
                new_text_hash: None,
                new_etag: None,
                new_last_modified: None,
                stale_count,
                elapsed_ms: elapsed_ms(start),
            };
        }
    };

    let Some(page) = extractor.extract(&body, url) else {
        return RecrawlOutcome {
            url: url.to_owned(),
            status: RecrawlStatus::Error,
            new_text_hash: None,
            new_etag: None,
            new_last_modified: None,
            stale_count,
            elapsed_ms: elapsed_ms(start),
        };
    };

    let new_hash = sha256_hex(page.text.as_bytes());
    let status = if new_hash == old_text_hash {
        RecrawlStatus::NotModified
    } else {
        RecrawlStatus::Updated
    };

    RecrawlOutcome {
        url: url.to_owned(),
        status,
        new_text_hash: Some(new_hash),
        new_etag,
        new_last_modified,
        stale_count: 0,
        elapsed_ms: elapsed_ms(start),
    }
}

/// Select up to `max_batch` most-overdue candidates.
#[must_use]
pub fn select_candidates(
    docs: &[RecrawlCandidate],
    now: f64,
    max_batch: usize,
) -> Vec<RecrawlCandidate> {
    let mut overdue: Vec<(f64, RecrawlCandidate)> = docs
        .iter()
        .filter_map(|doc| {
            let last = doc.last_recrawl_at.unwrap_or(doc.crawled_at);
            let due_at = last + doc.recrawl_interval_secs as f64;
            if now >= due_at {
                Some((now - due_at, doc.clone()))
            } else {
                None
            }
        })
        .collect();

    overdue.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    overdue.into_iter().take(max_batch).map(|(_, d)| d).collect()
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_tiers() {
        assert_eq!(compute_recrawl_interval(0.0), INTERVAL_STATIC);
        assert_eq!(compute_recrawl_interval(0.05), INTERVAL_LOW);
        assert_eq!(compute_recrawl_interval(0.3), INTERVAL_MEDIUM);
        assert_eq!(compute_recrawl_interval(0.9), INTERVAL_HIGH);
    }

    #[test]
    fn change_frequency_ema() {
        let updated = update_change_frequency(0.2, true, 0.3);
        assert!((updated - (0.3 + 0.7 * 0.2)).abs() < 1e-9);
    }

    #[test]
    fn select_candidates_orders_most_overdue_first() {
        let docs = vec![
            RecrawlCandidate {
                doc_id: 1,
                url: "a".into(),
                crawled_at: 0.0,
                recrawl_interval_secs: 100,
                ..Default::default()
            },
            RecrawlCandidate {
                doc_id: 2,
                url: "b".into(),
                crawled_at: 0.0,
                recrawl_interval_secs: 10,
                ..Default::default()
            },
        ];
        let selected = select_candidates(&docs, 1000.0, 10);
        assert_eq!(selected[0].doc_id, 2);
        assert_eq!(selected[1].doc_id, 1);
    }
}
