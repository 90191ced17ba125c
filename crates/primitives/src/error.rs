use thiserror::Error;

/// Errors raised by the shared primitives (hashing, wire framing, identity).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PrimitivesError {
    #[error("message exceeds maximum wire size of {max} bytes (got {actual})")]
    MessageTooLarge { max: usize, actual: usize },

    #[error("unknown message type id {0}")]
    UnknownMessageType(u8),

    #[error("msgpack encode failed: {0}")]
    EncodeFailed(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode failed: {0}")]
    DecodeFailed(#[from] rmp_serde::decode::Error),

    #[error("frame is truncated: expected {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("zstd error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

pub type PrimitivesResult<T> = Result<T, PrimitivesError>;
