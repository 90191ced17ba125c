//! Vector search adapter seam (§9 "Polymorphism"). Embedding generation
//! and ANN search are delegated to an external model/library; this crate
//! only defines the capability boundary and a result-fusion tag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexResult;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub doc_id: i64,
    pub score: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStoreStats {
    pub vector_count: usize,
}

/// Injectable vector index. A real implementation would wrap something
/// like an embedding model plus an ANN library (hnsw, faiss); this crate
/// ships no concrete implementation, mirroring `IndexConfig::vector_search`
/// being an opt-in surface.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, doc_id: i64, text: &str) -> IndexResult<()>;
    async fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<VectorMatch>>;
    async fn remove(&self, doc_id: i64) -> IndexResult<()>;
    async fn stats(&self) -> IndexResult<VectorStoreStats>;
    async fn close(&self) -> IndexResult<()>;
}

/// No-op implementation used when `IndexConfig::vector_search` is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullVectorStore;

#[async_trait]
impl VectorStore for NullVectorStore {
    async fn add(&self, _doc_id: i64, _text: &str) -> IndexResult<()> {
        Ok(())
    }

    async fn search(&self, _query: &str, _limit: usize) -> IndexResult<Vec<VectorMatch>> {
        Ok(Vec::new())
    }

    async fn remove(&self, _doc_id: i64) -> IndexResult<()> {
        Ok(())
    }

    async fn stats(&self) -> IndexResult<VectorStoreStats> {
        Ok(VectorStoreStats::default())
    }

    async fn close(&self) -> IndexResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_vector_store_reports_empty_results() {
        let store = NullVectorStore;
        store.add(1, "text").await.unwrap();
        let matches = store.search("query", 10).await.unwrap();
        assert!(matches.is_empty());
        assert_eq!(store.stats().await.unwrap().vector_count, 0);
    }
}
