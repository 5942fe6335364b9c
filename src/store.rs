//! Durable keyed persistence for pipeline state.
//!
//! [`StateStore`] is the object-safe port the orchestrator saves through.
//! Values are raw JSON strings; serialization stays with the caller so a
//! store never needs to know the record shapes it holds. Writes are
//! last-write-wins.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Keyed string storage with async access.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-memory store with optional per-entry TTL.
///
/// Expiry is lazy: the deadline is stored with the entry and checked on
/// read. Nothing sweeps in the background; an expired entry simply reads
/// as absent and is dropped at that point.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    default_ttl: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: None,
        }
    }

    /// Every entry written through `put` expires `ttl` after the write.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: Some(ttl),
        }
    }

    /// Write with an explicit TTL overriding the store default.
    pub async fn put_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: self.default_ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.expires_at.is_some_and(|t| Instant::now() >= t),
        };
        if expired {
            entries.remove(key);
            debug!(key, "entry expired on read");
            Ok(None)
        } else {
            Ok(entries.get(key).map(|e| e.value.clone()))
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory. Survives restarts.
///
/// Keys are sanitized into file names; `:` becomes `__` so namespaced
/// keys like `pipeline:<id>` stay readable on disk.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create the store, making the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| PipelineError::Store(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| match c {
                ':' => "__".to_string(),
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c.to_string(),
                _ => format!("%{:02x}", c as u32),
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        tokio::fs::write(&path, value)
            .await
            .map_err(|e| PipelineError::Store(format!("write {}: {e}", path.display())))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::Store(format!(
                "read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::Store(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }
}
