//! Blob storage for published catalog documents.
//!
//! Stores hold named documents under `/`-separated relative paths. Writes to
//! the same path are last-write-wins; listings are snapshots taken when
//! [`CatalogStore::list`] is called and can be replayed by cloning.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::watch;

use crate::watch::StoreWatcher;

mod dir;

pub use dir::DirStore;

/// Stream version used by published catalogs.
pub const DEFAULT_STREAM_VERSION: &str = "v1";

/// Returns the path of an unsigned index document.
///
/// Index version 1 maps to `streams/<v>/index.json`; later versions carry
/// their number as a suffix (`index2.json`).
#[must_use]
pub fn unsigned_index_path(stream_version: &str, index_version: u32) -> String {
    if index_version <= 1 {
        format!("streams/{stream_version}/index.json")
    } else {
        format!("streams/{stream_version}/index{index_version}.json")
    }
}

/// Errors raised by catalog stores.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StoreError {
    /// Raised when no blob exists at the path.
    #[error("blob {path} not found")]
    NotFound {
        /// Path that was requested.
        path: String,
    },
    /// Raised when a path is empty, absolute, or escapes the container.
    #[error("invalid blob path '{path}': {reason}")]
    InvalidPath {
        /// Offending path.
        path: String,
        /// Why the path was rejected.
        reason: &'static str,
    },
    /// Raised when the declared size disagrees with the payload.
    #[error("blob {path} declared {declared} bytes but received {actual}")]
    SizeMismatch {
        /// Path being written.
        path: String,
        /// Size supplied by the caller.
        declared: u64,
        /// Length of the payload.
        actual: u64,
    },
    /// Raised when the underlying storage fails.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Error reported by the storage layer.
        message: String,
    },
}

/// Named-blob storage handed to catalog loading.
pub trait CatalogStore: Send + Sync {
    /// Stores `data` at `path`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SizeMismatch`] when `size` differs from the
    /// payload length, [`StoreError::InvalidPath`] for malformed paths, or
    /// [`StoreError::Io`] when the write fails.
    fn put(&self, path: &str, data: &[u8], size: u64) -> Result<(), StoreError>;

    /// Reads the blob stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when nothing is stored there.
    fn get(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Lists the paths that start with `prefix`, in lexical order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the container cannot be read.
    fn list(&self, prefix: &str) -> Result<Listing, StoreError>;

    /// Removes every blob owned by the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when removal fails.
    fn remove_all(&self) -> Result<(), StoreError>;
}

/// Finite sequence of paths produced by [`CatalogStore::list`].
///
/// Cloning yields an independent cursor, and [`Listing::restart`] rewinds
/// this one.
#[derive(Clone, Debug, Default)]
pub struct Listing {
    paths: Arc<[String]>,
    position: usize,
}

impl Listing {
    pub(crate) fn new(paths: Vec<String>) -> Self {
        Self {
            paths: paths.into(),
            position: 0,
        }
    }

    /// Rewinds the cursor to the first path.
    pub const fn restart(&mut self) {
        self.position = 0;
    }

    /// Total number of paths in the listing.
    #[must_use]
    pub fn total(&self) -> usize {
        self.paths.len()
    }
}

impl Iterator for Listing {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.paths.get(self.position)?.clone();
        self.position += 1;
        Some(next)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.paths.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

pub(crate) fn validate_path(path: &str) -> Result<&str, StoreError> {
    let invalid = |reason| StoreError::InvalidPath {
        path: path.to_owned(),
        reason,
    };
    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(invalid("path must be relative and '/'-separated"));
    }
    if path
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(invalid("path contains an empty, '.' or '..' component"));
    }
    Ok(path)
}

pub(crate) fn check_size(path: &str, data: &[u8], size: u64) -> Result<(), StoreError> {
    let actual = u64::try_from(data.len()).unwrap_or(u64::MAX);
    if actual == size {
        return Ok(());
    }
    Err(StoreError::SizeMismatch {
        path: path.to_owned(),
        declared: size,
        actual,
    })
}

/// In-memory store, shared between clones.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    blobs: Arc<RwLock<BTreeMap<String, Arc<[u8]>>>>,
    changes: Arc<watch::Sender<u64>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            blobs: Arc::default(),
            changes: Arc::new(changes),
        }
    }

    /// Subscribes to mutations of this store.
    ///
    /// The watcher reports one initial change, then one change per batch of
    /// writes observed since the last receive.
    #[must_use]
    pub fn watch(&self) -> StoreWatcher {
        StoreWatcher::new(self.changes.subscribe())
    }

    /// Number of blobs currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogStore for MemoryStore {
    fn put(&self, path: &str, data: &[u8], size: u64) -> Result<(), StoreError> {
        let key = validate_path(path)?;
        check_size(key, data, size)?;
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), Arc::from(data));
        self.notify();
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let key = validate_path(path)?;
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|blob| blob.to_vec())
            .ok_or_else(|| StoreError::NotFound {
                path: key.to_owned(),
            })
    }

    fn list(&self, prefix: &str) -> Result<Listing, StoreError> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        let paths = blobs
            .range(prefix.to_owned()..)
            .map(|(path, _)| path)
            .take_while(|path| path.starts_with(prefix))
            .cloned()
            .collect();
        Ok(Listing::new(paths))
    }

    fn remove_all(&self) -> Result<(), StoreError> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.notify();
        Ok(())
    }
}
