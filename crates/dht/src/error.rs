use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DhtError {
    #[error("encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type DhtResult<T> = Result<T, DhtError>;
