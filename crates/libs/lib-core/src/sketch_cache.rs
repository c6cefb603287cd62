//! On-disk LRU cache of compiled sketch artifacts.
//!
//! Keys are sketch fingerprints, values are the finished artifact zip bytes.
//! One blob file per key lives in the backing directory; an in-memory LRU
//! index bounds the entry count and decides eviction. Puts write to a temp
//! file and rename into place so a crash never leaves a torn blob.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

/// Default maximum number of cached sketches.
pub const DEFAULT_CAPACITY: usize = 50;

const BLOB_SUFFIX: &str = ".blob";

/// Thread-safe bounded blob store.
pub struct SketchCache {
    dir: PathBuf,
    index: Mutex<LruCache<String, ()>>,
    capacity: usize,
    disabled: bool,
}

impl SketchCache {
    /// Open (or create) a cache rooted at `dir`.
    ///
    /// Existing blobs are adopted into the index in modification-time order
    /// so a restarted server keeps its warm entries. When `disabled` is set
    /// the cache never stores or returns anything.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    #[allow(clippy::expect_used)] // Capacity 0 is a programmer error, not runtime
    pub fn open(dir: &Path, capacity: usize, disabled: bool) -> Result<Self> {
        let cap = NonZeroUsize::new(capacity).expect("cache capacity must be > 0");
        std::fs::create_dir_all(dir)?;

        let mut index = LruCache::new(cap);
        if !disabled {
            let mut existing: Vec<(std::time::SystemTime, String)> = Vec::new();
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(key) = name.strip_suffix(BLOB_SUFFIX) {
                    let mtime = entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .unwrap_or(std::time::UNIX_EPOCH);
                    existing.push((mtime, key.to_string()));
                }
            }
            // Oldest first so the most recent blobs end up most-recently-used.
            existing.sort();
            for (_, key) in existing {
                index.put(key, ());
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            index: Mutex::new(index),
            capacity,
            disabled,
        })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{BLOB_SUFFIX}"))
    }

    /// Fetch the blob for `key`, refreshing its LRU position.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if self.disabled {
            debug!("sketch caching disabled, skipping cache get");
            return None;
        }
        let mut index = self.index.lock().await;
        index.get(key)?;
        match tokio::fs::read(self.blob_path(key)).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                // Index said yes but the blob is gone; drop the stale entry.
                warn!(key, error = %err, "cache blob missing, evicting index entry");
                index.pop(key);
                None
            }
        }
    }

    /// Insert `bytes` under `key`, evicting the least-recently-used entry
    /// when the cache is full. Last writer wins for the same key.
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if self.disabled {
            debug!("sketch caching disabled, skipping cache put");
            return Ok(());
        }
        let mut index = self.index.lock().await;

        if index.len() >= self.capacity && !index.contains(key) {
            if let Some((evicted, ())) = index.pop_lru() {
                debug!(key = %evicted, "evicting LRU cache entry");
                if let Err(err) = tokio::fs::remove_file(self.blob_path(&evicted)).await {
                    warn!(key = %evicted, error = %err, "failed to remove evicted blob");
                }
            }
        }

        let tmp = self.dir.join(format!("{key}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.blob_path(key)).await?;
        index.put(key.to_string(), ());
        Ok(())
    }

    /// Drop every entry and its backing blob.
    pub async fn clear(&self) {
        let mut index = self.index.lock().await;
        while let Some((key, ())) = index.pop_lru() {
            if let Err(err) = tokio::fs::remove_file(self.blob_path(&key)).await {
                warn!(key, error = %err, "failed to remove blob during clear");
            }
        }
        debug!("sketch cache cleared");
    }

    /// Flush the in-memory index. Blobs stay on disk for the next open.
    pub async fn close(&self) {
        let mut index = self.index.lock().await;
        index.clear();
        debug!("sketch cache closed");
    }

    /// Current entry count.
    pub async fn len(&self) -> usize {
        self.index.lock().await.len()
    }

    /// Check if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
