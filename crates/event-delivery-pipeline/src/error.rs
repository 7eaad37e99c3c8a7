//! Pipeline error types.

use thiserror::Error;

/// Error type for delivery pipeline operations.
///
/// None of these are fatal to the embedding process: dispatch failures keep
/// their batch in the pending store, capacity drops are logged, and the
/// shutdown path swallows internal errors entirely.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Durable store error
    #[error("Store error: {0}")]
    Store(#[from] keyed_blob_store::StoreError),

    /// HTTP transport error from reqwest
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Batch formatting error
    #[error("Format error: {0}")]
    Format(String),
}

/// Result type alias using PipelineError.
pub type PipelineResult<T> = Result<T, PipelineError>;
