use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RouterError {
    #[error("dht error: {0}")]
    Dht(#[from] infomesh_dht::DhtError),
}

pub type RouterResult<T> = Result<T, RouterError>;
