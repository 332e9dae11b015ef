//! Object storage port and the two reference backends.
//!
//! ```text
//! LocalStore objects:
//! <storage.root>/
//!   <bucket>/
//!     <key>            (keys may contain '/', mapped to subdirectories)
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use ferry_archive::entry::entry_path;
use ferry_core::{ObjectKey, StorageConfig};

use crate::error::StorageError;

/// Async object store keyed by [`ObjectKey`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store everything `body` yields under `key`, replacing any previous
    /// object. Returns the byte count.
    async fn put(
        &self,
        key: &ObjectKey,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, StorageError>;

    /// Stream the object under `key` into `sink`. Returns the byte count.
    async fn get(
        &self,
        key: &ObjectKey,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, StorageError>;

    async fn exists(&self, key: &ObjectKey) -> Result<bool, StorageError>;
}

/// Opens the [`ObjectStore`] a [`StorageConfig`] points at.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StorageError>;
}

fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    let bad = bucket.trim().is_empty()
        || bucket == "."
        || bucket == ".."
        || bucket.contains(['/', '\\']);
    if bad {
        return Err(StorageError::Connect {
            bucket: bucket.to_string(),
            reason: "bucket must be a single non-empty path segment".to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LocalStore
// ---------------------------------------------------------------------------

/// Objects as plain files under `<root>/<bucket>/`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, key: &ObjectKey) -> Result<PathBuf, StorageError> {
        entry_path(&self.dir, key.as_str().as_bytes())
            .map_err(|_| StorageError::InvalidKey { key: key.clone() })
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(
        &self,
        key: &ObjectKey,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, StorageError> {
        let path = self.object_path(key)?;
        let io = |path: &Path, source| StorageError::Io {
            key: key.clone(),
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io(parent, e))?;
        }

        // Write flow: stream → `.tmp` sibling → flush → rename.
        let tmp = path.with_file_name(format!(
            "{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("object")
        ));
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| io(&tmp, e))?;
        let written = tokio::io::copy(body, &mut file)
            .await
            .map_err(|e| io(&tmp, e))?;
        file.sync_all().await.map_err(|e| io(&tmp, e))?;
        drop(file);
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io(&path, e))?;
        debug!(key = %key, bytes = written, "stored object");
        Ok(written)
    }

    async fn get(
        &self,
        key: &ObjectKey,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, StorageError> {
        let path = self.object_path(key)?;
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound { key: key.clone() })
            }
            Err(e) => {
                return Err(StorageError::Io {
                    key: key.clone(),
                    path,
                    source: e,
                })
            }
        };
        let read = tokio::io::copy(&mut file, sink)
            .await
            .map_err(|e| StorageError::Stream {
                key: key.clone(),
                source: e,
            })?;
        sink.flush().await.map_err(|e| StorageError::Stream {
            key: key.clone(),
            source: e,
        })?;
        Ok(read)
    }

    async fn exists(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::Io {
                key: key.clone(),
                path,
                source: e,
            })
    }
}

/// Connects [`LocalStore`]s under `config.root`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnector;

#[async_trait]
impl StoreConnector for LocalConnector {
    async fn connect(&self, config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
        validate_bucket(&config.bucket)?;
        let dir = config.root.join(&config.bucket);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::Connect {
                bucket: config.bucket.clone(),
                reason: format!("{}: {e}", dir.display()),
            })?;
        Ok(Arc::new(LocalStore::new(dir)))
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store; counts `get` calls per key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<ObjectKey, Vec<u8>>>,
    gets: Mutex<HashMap<ObjectKey, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: ObjectKey, bytes: Vec<u8>) {
        lock(&self.objects).insert(key, bytes);
    }

    pub fn object(&self, key: &ObjectKey) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<_> = lock(&self.objects).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// How many times `get` was called for `key`.
    pub fn get_count(&self, key: &ObjectKey) -> usize {
        lock(&self.gets).get(key).copied().unwrap_or(0)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        key: &ObjectKey,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, StorageError> {
        let mut bytes = Vec::new();
        tokio::io::copy(body, &mut bytes)
            .await
            .map_err(|e| StorageError::Stream {
                key: key.clone(),
                source: e,
            })?;
        let len = bytes.len() as u64;
        self.insert(key.clone(), bytes);
        Ok(len)
    }

    async fn get(
        &self,
        key: &ObjectKey,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, StorageError> {
        *lock(&self.gets).entry(key.clone()).or_insert(0) += 1;
        let bytes = self
            .object(key)
            .ok_or_else(|| StorageError::NotFound { key: key.clone() })?;
        let stream = |e| StorageError::Stream {
            key: key.clone(),
            source: e,
        };
        sink.write_all(&bytes).await.map_err(stream)?;
        sink.flush().await.map_err(stream)?;
        Ok(bytes.len() as u64)
    }

    async fn exists(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        Ok(lock(&self.objects).contains_key(key))
    }
}

/// Hands out the same [`MemoryStore`] for every bucket.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
        validate_bucket(&config.bucket)?;
        Ok(self.store.clone())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
