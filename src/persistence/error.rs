use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read tree file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write tree file `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode tree file `{path}`: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode tree: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid node `{name}` in persisted tree: {source}")]
    InvalidNode {
        name: String,
        #[source]
        source: crate::node::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
