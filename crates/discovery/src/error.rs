use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    #[error("encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("malformed announce packet: {0}")]
    MalformedPacket(String),

    #[error("invalid multiaddr: {0}")]
    InvalidMultiaddr(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
