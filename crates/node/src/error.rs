use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NodeError {
    #[error("peer '{0}' is not in the index-submit allow-list")]
    SubmitterNotAllowed(String),

    #[error("status snapshot write failed: {0}")]
    StatusWrite(#[from] std::io::Error),

    #[error("status snapshot serialization failed: {0}")]
    StatusSerialize(#[from] serde_json::Error),

    #[error("crawl error: {0}")]
    Crawl(#[from] infomesh_crawl::CrawlError),

    #[error("index error: {0}")]
    Index(#[from] infomesh_index::IndexError),

    #[error("credits error: {0}")]
    Credits(#[from] infomesh_credits::CreditsError),
}

pub type NodeResult<T> = Result<T, NodeError>;
