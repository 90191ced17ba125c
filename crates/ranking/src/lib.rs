//! Search result ranking: composite BM25/freshness/trust/authority
//! scoring, hybrid RRF fusion, link-graph domain authority, and
//! presentation-ready data-quality signals.

pub mod data_quality;
pub mod error;
pub mod link_graph;
pub mod merge;
pub mod score;

pub use error::{RankingError, RankingResult};
pub use link_graph::{LinkGraph, LinkGraphStats};
pub use merge::{merge_results, MergedResult, ResultSource};
pub use score::{
    combined_score, freshness_score, normalize_bm25, rank_local_results, rank_results, RankedResult, RawCandidate,
    DEFAULT_TRUST,
};
