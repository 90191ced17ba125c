//! Reciprocal Rank Fusion of keyword (FTS5/BM25) and vector search
//! result lists into a single hybrid ranking (§4.8, §4.7).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use infomesh_index::{SearchResult, VectorMatch};

const RRF_K: f64 = 60.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultSource {
    Fts,
    Vector,
    Hybrid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub doc_id: i64,
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub fts_score: Option<f64>,
    pub vector_score: Option<f32>,
    pub combined_score: f64,
    pub source: ResultSource,
}

struct Accumulator {
    doc_id: i64,
    url: String,
    title: String,
    snippet: String,
    fts_score: Option<f64>,
    vector_score: Option<f32>,
    rrf: f64,
    source: ResultSource,
}

/// Merge FTS5 and vector result lists keyed by URL. A document appearing
/// in both rankings is tagged `Hybrid` and accumulates both lists'
/// reciprocal-rank contributions.
#[must_use]
pub fn merge_results(
    fts_results: &[SearchResult],
    vector_results: &[(VectorMatch, String, String, String)],
    limit: usize,
    fts_weight: f64,
    vector_weight: f64,
) -> Vec<MergedResult> {
    let mut scores: HashMap<String, Accumulator> = HashMap::new();

    for (rank, r) in fts_results.iter().enumerate() {
        let rrf = fts_weight / (RRF_K + (rank + 1) as f64);
        let entry = scores.entry(r.url.clone()).or_insert_with(|| Accumulator {
            doc_id: r.doc_id,
            url: r.url.clone(),
            title: r.title.clone(),
            snippet: r.snippet.clone(),
            fts_score: None,
            vector_score: None,
            rrf: 0.0,
            source: ResultSource::Fts,
        });
        entry.rrf += rrf;
        entry.fts_score = Some(r.score);
    }

    for (rank, (m, url, title, snippet)) in vector_results.iter().enumerate() {
        let rrf = vector_weight / (RRF_K + (rank + 1) as f64);
        let entry = scores
            .entry(url.clone())
            .and_modify(|e| e.source = ResultSource::Hybrid)
            .or_insert_with(|| Accumulator {
                doc_id: m.doc_id,
                url: url.clone(),
                title: title.clone(),
                snippet: snippet.clone(),
                fts_score: None,
                vector_score: None,
                rrf: 0.0,
                source: ResultSource::Vector,
            });
        entry.rrf += rrf;
        entry.vector_score = Some(m.score);
    }

    let mut ranked: Vec<Accumulator> = scores.into_values().collect();
    ranked.sort_by(|a, b| b.rrf.partial_cmp(&a.rrf).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(limit);

    let hybrid_count = ranked.iter().filter(|r| r.source == ResultSource::Hybrid).count();
    tracing::info!(
        fts_count = fts_results.len(),
        vector_count = vector_results.len(),
        merged_count = ranked.len(),
        hybrid_count,
        "results_merged"
    );

    ranked
        .into_iter()
        .map(|a| MergedResult {
            doc_id: a.doc_id,
            url: a.url,
            title: a.title,
            snippet: a.snippet,
            fts_score: a.fts_score,
            vector_score: a.vector_score,
            combined_score: a.rrf,
            source: a.source,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fts_result(doc_id: i64, url: &str, score: f64) -> SearchResult {
        SearchResult {
            doc_id,
            url: url.to_owned(),
            title: "title".into(),
            snippet: "snippet".into(),
            score,
            language: None,
            crawled_at: 0.0,
        }
    }

    #[test]
    fn document_in_both_lists_is_tagged_hybrid() {
        let fts = vec![fts_result(1, "https://a.com", 5.0)];
        let vector = vec![(
            VectorMatch { doc_id: 1, score: 0.9 },
            "https://a.com".to_owned(),
            "title".to_owned(),
            "snippet".to_owned(),
        )];
        let merged = merge_results(&fts, &vector, 10, 1.0, 1.0);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, ResultSource::Hybrid);
        assert!(merged[0].fts_score.is_some());
        assert!(merged[0].vector_score.is_some());
    }

    #[test]
    fn fts_only_document_ranks_below_documents_found_in_both() {
        let fts = vec![fts_result(1, "https://only-fts.com", 5.0), fts_result(2, "https://both.com", 5.0)];
        let vector = vec![(
            VectorMatch { doc_id: 2, score: 0.9 },
            "https://both.com".to_owned(),
            "title".to_owned(),
            "snippet".to_owned(),
        )];
        let merged = merge_results(&fts, &vector, 10, 1.0, 1.0);
        assert_eq!(merged[0].url, "https://both.com");
    }
}
