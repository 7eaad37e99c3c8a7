//! Durable keyed storage for offline-resilient delivery pipelines.
//!
//! This crate provides:
//! - `KeyedStore`: capacity-bounded key-value store persisted as one blob
//! - `TicketLock`: strict-FIFO async mutex serializing store cycles
//! - `StorageMedium`: the pluggable blob persistence trait, with in-memory
//!   and file-backed implementations

mod medium;
mod mutex;
mod store;

pub use medium::{FileMedium, MemoryMedium, StorageMedium};
pub use mutex::{TicketGuard, TicketLock};
pub use store::KeyedStore;

use thiserror::Error;

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Blob medium I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob or value (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store key unusable by the medium
    #[error("Invalid store key: {0}")]
    InvalidKey(String),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
