//! Local full-text index: FTS5-backed document store, snapshot
//! export/import, and the vector search capability seam.

pub mod error;
pub mod sanitize;
pub mod snapshot;
pub mod store;
pub mod vector;

pub use error::{IndexError, IndexResult};
pub use store::{DocumentStats, ExportedDocument, IndexedDocument, LocalStore, SearchFilters, SearchResult};
pub use vector::{NullVectorStore, VectorMatch, VectorStore, VectorStoreStats};
