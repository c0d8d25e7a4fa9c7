// store.rs - durable key-value slots backing the queue and summary cache

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

pub const MAX_SLOT_KEY_LENGTH: usize = 128;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid slot key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("queue is full ({capacity} entries)")]
    QueueFull { capacity: usize },
}

/// Validated slot name. Keys double as file names in the file backend, so the
/// rules forbid anything that could escape the slot directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey(String);

impl SlotKey {
    pub fn new(key: impl Into<String>) -> Result<Self, StoreError> {
        let key = key.into();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(key: &str) -> Result<(), StoreError> {
        let invalid = |reason: &str| StoreError::InvalidKey {
            key: key.chars().take(50).collect(),
            reason: reason.to_string(),
        };

        if key.trim().is_empty() {
            return Err(invalid("key cannot be empty"));
        }
        if key.len() > MAX_SLOT_KEY_LENGTH {
            return Err(invalid("key exceeds maximum length"));
        }
        if key.contains('\0') {
            return Err(invalid("key cannot contain null bytes"));
        }
        if key.contains("..") {
            return Err(invalid("key cannot contain path traversal sequences"));
        }
        if key.contains('/') || key.contains('\\') {
            return Err(invalid("key cannot contain path separators"));
        }
        if key.chars().any(char::is_control) {
            return Err(invalid("key contains control characters"));
        }
        Ok(())
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Origin-scoped durable storage. Writes replace the whole slot; the last
/// writer wins and readers never observe a partial value.
#[async_trait::async_trait]
pub trait SlotStore: Send + Sync {
    async fn read(&self, key: &SlotKey) -> Result<Option<String>, StoreError>;
    async fn write(&self, key: &SlotKey, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &SlotKey) -> Result<(), StoreError>;
}

/// Volatile backend for tests and for hosts that bridge persistence
/// themselves (a web shell forwarding to browser storage).
#[derive(Debug, Default)]
pub struct MemorySlots {
    slots: RwLock<HashMap<String, String>>,
}

impl MemorySlots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SlotStore for MemorySlots {
    async fn read(&self, key: &SlotKey) -> Result<Option<String>, StoreError> {
        Ok(self.slots.read().await.get(key.as_str()).cloned())
    }

    async fn write(&self, key: &SlotKey, value: &str) -> Result<(), StoreError> {
        self.slots
            .write()
            .await
            .insert(key.as_str().to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &SlotKey) -> Result<(), StoreError> {
        self.slots.write().await.remove(key.as_str());
        Ok(())
    }
}

/// File-per-slot backend for native hosts. Each write lands in a temp file
/// first and is renamed over the slot, so a crash never leaves a torn slot.
pub struct FileSlots {
    root: PathBuf,
}

impl FileSlots {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &SlotKey) -> PathBuf {
        self.root.join(format!("{}.json", key.as_str()))
    }

    fn write_atomic(path: &Path, value: &str) -> Result<(), StoreError> {
        let tmp_path = path.with_extension("tmp");

        let mut file = File::create(&tmp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;

        std::fs::rename(&tmp_path, path)?;

        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl SlotStore for FileSlots {
    async fn read(&self, key: &SlotKey) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &SlotKey, value: &str) -> Result<(), StoreError> {
        Self::write_atomic(&self.path_for(key), value)
    }

    async fn remove(&self, key: &SlotKey) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
