//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Unknown payload schema: {0}")]
    UnknownSchema(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Stream closed")]
    StreamClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
