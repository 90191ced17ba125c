use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CreditsError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unknown action type '{0}'")]
    UnknownAction(String),
}

pub type CreditsResult<T> = Result<T, CreditsError>;
