use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IndexError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid tokenizer '{0}'; allowed: unicode61, ascii, porter, trigram")]
    InvalidTokenizer(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format version {found} is newer than supported version {supported}")]
    SnapshotTooNew { found: u32, supported: u32 },

    #[error("snapshot is corrupt: {0}")]
    CorruptSnapshot(String),

    #[error("msgpack encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;
