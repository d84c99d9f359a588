#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),
    #[error("invalid poll interval: {0} (must be at least 1 second)")]
    InvalidPollInterval(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
