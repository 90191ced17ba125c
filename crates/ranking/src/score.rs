//! Composite ranking signals: BM25 normalization, freshness decay, and
//! the weighted combination used by both local and distributed search
//! (§4.8).

use serde::{Deserialize, Serialize};

use infomesh_index::SearchResult;

pub const WEIGHT_BM25: f64 = 0.45;
pub const WEIGHT_FRESHNESS: f64 = 0.20;
pub const WEIGHT_TRUST: f64 = 0.15;
pub const WEIGHT_AUTHORITY: f64 = 0.20;

/// Half-life for the exponential freshness decay (7 days).
const FRESHNESS_HALF_LIFE_SECS: f64 = 7.0 * 24.0 * 3600.0;
const MIN_FRESHNESS: f64 = 0.05;

pub const DEFAULT_TRUST: f64 = 0.50;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub doc_id: i64,
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub bm25_score: f64,
    pub freshness_score: f64,
    pub trust_score: f64,
    pub authority_score: f64,
    pub combined_score: f64,
    pub crawled_at: f64,
    pub peer_id: Option<String>,
}

/// A candidate awaiting composite scoring.
#[derive(Clone, Debug)]
pub struct RawCandidate {
    pub doc_id: i64,
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub bm25_raw: f64,
    pub crawled_at: f64,
    pub peer_id: Option<String>,
    pub trust: f64,
    pub authority: f64,
}

/// `f(t) = max(MIN_FRESHNESS, 2^(-Δt / half_life))`.
#[must_use]
pub fn freshness_score(crawled_at: f64, now: f64) -> f64 {
    let age = (now - crawled_at).max(0.0);
    let decay = 2f64.powf(-age / FRESHNESS_HALF_LIFE_SECS);
    decay.max(MIN_FRESHNESS)
}

/// Saturating normalization: a score equal to `max_score` maps to 0.5.
#[must_use]
pub fn normalize_bm25(score: f64, max_score: f64) -> f64 {
    if score <= 0.0 {
        return 0.0;
    }
    score / (score + max_score)
}

#[must_use]
pub fn combined_score(bm25: f64, freshness: f64, trust: f64, authority: f64) -> f64 {
    WEIGHT_BM25 * bm25 + WEIGHT_FRESHNESS * freshness + WEIGHT_TRUST * trust + WEIGHT_AUTHORITY * authority
}

/// Rank a batch of candidates: normalize BM25 against the batch max,
/// compute freshness, combine, sort descending, truncate to `limit`.
#[must_use]
pub fn rank_results(candidates: &[RawCandidate], limit: usize, now: f64) -> Vec<RankedResult> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let raw_max = candidates.iter().map(|c| c.bm25_raw).fold(f64::MIN, f64::max);
    let max_bm25 = if raw_max > 0.0 { raw_max } else { 1.0 };

    let mut scored: Vec<RankedResult> = candidates
        .iter()
        .map(|c| {
            let norm_bm25 = normalize_bm25(c.bm25_raw, max_bm25);
            let fresh = freshness_score(c.crawled_at, now);
            let combo = combined_score(norm_bm25, fresh, c.trust, c.authority);
            RankedResult {
                doc_id: c.doc_id,
                url: c.url.clone(),
                title: c.title.clone(),
                snippet: c.snippet.clone(),
                bm25_score: norm_bm25,
                freshness_score: fresh,
                trust_score: c.trust,
                authority_score: c.authority,
                combined_score: combo,
                crawled_at: c.crawled_at,
                peer_id: c.peer_id.clone(),
            }
        })
        .collect();

    scored.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);

    tracing::info!(candidates = candidates.len(), returned = scored.len(), "results_ranked");
    scored
}

/// Rank `LocalStore::search` results directly, optionally supplying a
/// per-URL domain authority lookup.
#[must_use]
pub fn rank_local_results(
    results: &[SearchResult],
    trust: f64,
    authority_fn: Option<&dyn Fn(&str) -> f64>,
    limit: usize,
    now: f64,
) -> Vec<RankedResult> {
    let candidates: Vec<RawCandidate> = results
        .iter()
        .map(|r| RawCandidate {
            doc_id: r.doc_id,
            url: r.url.clone(),
            title: r.title.clone(),
            snippet: r.snippet.clone(),
            bm25_raw: r.score,
            crawled_at: r.crawled_at,
            peer_id: None,
            trust,
            authority: authority_fn.map_or(0.0, |f| f(&r.url)),
        })
        .collect();
    rank_results(&candidates, limit, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_decays_toward_minimum_with_age() {
        let now = 1_000_000.0;
        assert_eq!(freshness_score(now, now), 1.0);
        let half_life_old = freshness_score(now - FRESHNESS_HALF_LIFE_SECS, now);
        assert!((half_life_old - 0.5).abs() < 1e-9);
        let ancient = freshness_score(now - FRESHNESS_HALF_LIFE_SECS * 100.0, now);
        assert_eq!(ancient, MIN_FRESHNESS);
    }

    #[test]
    fn normalize_bm25_maps_max_score_to_half() {
        assert_eq!(normalize_bm25(5.0, 5.0), 0.5);
        assert_eq!(normalize_bm25(0.0, 5.0), 0.0);
        assert_eq!(normalize_bm25(-1.0, 5.0), 0.0);
    }

    #[test]
    fn rank_results_sorts_descending_by_combined_score() {
        let now = 1_000_000.0;
        let candidates = vec![
            RawCandidate {
                doc_id: 1,
                url: "https://a.com".into(),
                title: "A".into(),
                snippet: "a".into(),
                bm25_raw: 1.0,
                crawled_at: now - 1_000_000.0,
                peer_id: None,
                trust: 0.5,
                authority: 0.0,
            },
            RawCandidate {
                doc_id: 2,
                url: "https://b.com".into(),
                title: "B".into(),
                snippet: "b".into(),
                bm25_raw: 10.0,
                crawled_at: now,
                peer_id: None,
                trust: 0.9,
                authority: 0.8,
            },
        ];
        let ranked = rank_results(&candidates, 10, now);
        assert_eq!(ranked[0].url, "https://b.com");
        assert!(ranked[0].combined_score > ranked[1].combined_score);
    }

    #[test]
    fn rank_results_respects_limit() {
        let now = 1_000_000.0;
        let candidates: Vec<RawCandidate> = (0..5)
            .map(|i| RawCandidate {
                doc_id: i,
                url: format!("https://{i}.com"),
                title: String::new(),
                snippet: String::new(),
                bm25_raw: f64::from(i) + 1.0,
                crawled_at: now,
                peer_id: None,
                trust: DEFAULT_TRUST,
                authority: 0.0,
            })
            .collect();
        let ranked = rank_results(&candidates, 2, now);
        assert_eq!(ranked.len(), 2);
    }
}
