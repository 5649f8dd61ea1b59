//! Load-on-start / save-on-mutate bridge to the external blob store.
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::state::{RewardState, StateInvariantError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Asynchronous key/value store holding serialized blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the store cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the write is rejected.
    async fn set(&self, key: &str, blob: &str) -> Result<(), StorageError>;
}

/// In-process store; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read and write fail (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        *self
            .unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = unavailable;
    }

    /// Raw blob currently stored under `key`.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Seed a raw blob, bypassing availability checks.
    pub fn insert_raw(&self, key: &str, blob: impl Into<String>) {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), blob.into());
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if *self
            .unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(StorageError::Storage("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.insert_raw(key, blob);
        Ok(())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{file_name}.json"))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(key), blob).await?;
        Ok(())
    }
}

/// Why startup fell back to a fresh state.
#[derive(Debug, Error)]
pub enum LoadFallback {
    #[error("no saved state")]
    Missing,
    #[error("store unavailable: {0}")]
    Unavailable(StorageError),
    #[error("saved state unreadable: {0}")]
    Corrupt(serde_json::Error),
    #[error("saved state inconsistent: {0}")]
    Inconsistent(StateInvariantError),
}

/// Result of the startup load.
#[derive(Debug)]
pub enum LoadOutcome {
    Restored(RewardState),
    Fresh {
        state: RewardState,
        reason: LoadFallback,
    },
}

impl LoadOutcome {
    #[must_use]
    pub const fn state(&self) -> &RewardState {
        match self {
            Self::Restored(state) | Self::Fresh { state, .. } => state,
        }
    }

    #[must_use]
    pub fn into_state(self) -> RewardState {
        match self {
            Self::Restored(state) | Self::Fresh { state, .. } => state,
        }
    }

    #[must_use]
    pub const fn is_restored(&self) -> bool {
        matches!(self, Self::Restored(_))
    }
}

/// Adapter between reducer state and the blob store, bound to one key.
#[derive(Debug, Clone)]
pub struct PersistenceBridge<S> {
    store: S,
    key: String,
}

impl<S: BlobStore> PersistenceBridge<S> {
    #[must_use]
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the saved state, falling back to a fresh state for `today`.
    pub async fn load(&self, today: &str) -> LoadOutcome {
        let reason = match self.store.get(&self.key).await {
            Ok(Some(blob)) => match serde_json::from_str::<RewardState>(&blob) {
                Ok(state) => match state.check_invariants() {
                    Ok(()) => return LoadOutcome::Restored(state),
                    Err(err) => LoadFallback::Inconsistent(err),
                },
                Err(err) => LoadFallback::Corrupt(err),
            },
            Ok(None) => LoadFallback::Missing,
            Err(err) => LoadFallback::Unavailable(err),
        };

        if matches!(reason, LoadFallback::Missing) {
            log::info!("no saved reward state under {}; starting fresh", self.key);
        } else {
            log::warn!("{reason}; starting fresh for {today}");
        }
        LoadOutcome::Fresh {
            state: RewardState::fresh(today),
            reason,
        }
    }

    /// Serialize and write `state`, overwriting the previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when serialization or the write fails.
    pub async fn save(&self, state: &RewardState) -> Result<(), StorageError> {
        let blob = serde_json::to_string(state)?;
        self.store.set(&self.key, &blob).await
    }
}
