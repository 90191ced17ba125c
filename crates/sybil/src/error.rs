use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SybilError {
    #[error("PoW exhausted {0} nonces without meeting the difficulty target")]
    PowExhausted(u64),

    #[error("failed to parse IP address '{0}'")]
    InvalidIp(String),

    #[error("pow cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SybilResult<T> = Result<T, SybilError>;
