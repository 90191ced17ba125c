use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CrawlError {
    #[error("dedup store error: {0}")]
    Dedup(#[from] rusqlite::Error),

    #[error("ssrf validation failed: {0}")]
    Ssrf(#[from] infomesh_ssrf::SsrfError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CrawlResult<T> = Result<T, CrawlError>;
