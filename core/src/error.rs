use thiserror::Error;

use crate::{
    index::BackendError,
    meta::ChunkMetaError,
    output::MergeError,
    query::QueryError,
    storage::StorageError,
};

/// The outcome of a failed store or metadata request
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("chunk `{0}' not found")]
    NotFound(String),

    /// The backend reported that it could not finish the operation in time
    #[error("the operation timed out")]
    Timeout,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    ChunkMeta(#[from] ChunkMetaError),
}

impl Error {
    /// A stable numeric code for this error, modelled after HTTP status codes
    pub fn code(&self) -> u16 {
        match self {
            Error::MalformedRequest(_) | Error::Query(_) => 400,
            Error::NotFound(_) => 404,
            Error::Timeout => 408,
            Error::Backend(BackendError::ScrollExpired(_)) => 410,
            Error::Backend(BackendError::Transport { status, .. }) => *status,
            Error::Merge(MergeError::FormatConflict { .. } | MergeError::UnsupportedChunkType(_))
            | Error::ChunkMeta(ChunkMetaError::UnsupportedChunkType(_)) => 409,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedRequest(e.to_string())
    }
}
