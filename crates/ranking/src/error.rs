use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RankingError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type RankingResult<T> = Result<T, RankingError>;
