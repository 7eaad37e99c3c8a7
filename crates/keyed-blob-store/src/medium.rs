//! Durable blob medium collaborators.
//!
//! A store instance keeps its whole map as one serialized blob under a
//! fixed store key; the medium only has to persist opaque strings.

use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Persistent single-blob medium backing a [`KeyedStore`](crate::KeyedStore).
#[async_trait]
pub trait StorageMedium: Send + Sync {
    /// Read the blob stored under `key`, or `None` if absent.
    async fn read(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write `blob` under `key`, replacing any previous value.
    async fn write(&self, key: &str, blob: &str) -> StoreResult<()>;

    /// Delete the blob under `key`. Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// In-memory medium. Nothing survives the process; useful for tests and
/// ephemeral pipelines.
#[derive(Default)]
pub struct MemoryMedium {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageMedium for MemoryMedium {
    async fn read(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.blobs.lock().expect("lock poisoned").get(key).cloned())
    }

    async fn write(&self, key: &str, blob: &str) -> StoreResult<()> {
        self.blobs
            .lock()
            .expect("lock poisoned")
            .insert(key.to_string(), blob.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.blobs.lock().expect("lock poisoned").remove(key);
        Ok(())
    }
}

/// File-backed medium: one file per store key inside a base directory.
///
/// Concurrent writers are not expected here; the store's ticket lock already
/// serializes every read-write cycle against a given key.
pub struct FileMedium {
    base_dir: PathBuf,
}

impl FileMedium {
    /// Create a medium rooted at `base_dir`, creating the directory if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        // Store keys become file names; reject anything that could escape
        // the base directory.
        if key.is_empty() || key.contains('/') || key.contains('\\') || key == "." || key == ".." {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl StorageMedium for FileMedium {
    async fn read(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, key: &str, blob: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::write(&path, blob).await?;
        debug!(key = %key, bytes = blob.len(), "Wrote store blob");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
