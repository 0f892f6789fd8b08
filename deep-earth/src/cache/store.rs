//! Persistent, categorized blob store with TTL expiry.

use super::clock::{Clock, SystemClock};
use super::metadata::{self, CacheEntry, Decoded};
use super::path::{category_directory, entry_path, is_valid_key, metadata_path};
use super::types::{CacheCategory, CacheError, CategoryTtl};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Keyed blob store rooted at one directory.
///
/// The metadata document is the source of truth: a file on disk without a
/// metadata entry is never returned. Expired entries are evicted when they
/// are read; there is no background sweeper.
///
/// Not safe for concurrent writers in separate processes. Within a process
/// the metadata map is guarded by a mutex that is never held across an
/// await point.
pub struct CacheStore {
    root: PathBuf,
    ttl: CategoryTtl,
    clock: Arc<dyn Clock>,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl CacheStore {
    /// Opens (or creates) a cache rooted at `root` using the system clock.
    pub fn open(root: impl Into<PathBuf>, ttl: CategoryTtl) -> Result<Self, CacheError> {
        Self::with_clock(root, ttl, Arc::new(SystemClock))
    }

    /// Opens a cache with an explicit clock.
    ///
    /// Loads the metadata document, migrating an older schema and
    /// persisting the result immediately. An unreadable document is
    /// treated as an empty cache.
    pub fn with_clock(
        root: impl Into<PathBuf>,
        ttl: CategoryTtl,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let meta_path = metadata_path(&root);
        let (entries, migrated) = match fs::read(&meta_path) {
            Ok(bytes) => match metadata::decode(&bytes, &ttl) {
                Decoded::Current(entries) => (entries, false),
                Decoded::Migrated(entries) => {
                    info!(
                        path = %meta_path.display(),
                        entries = entries.len(),
                        "Migrated cache metadata to v{}",
                        metadata::METADATA_VERSION
                    );
                    (entries, true)
                }
                Decoded::Corrupt => (BTreeMap::new(), false),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (BTreeMap::new(), false),
            Err(e) => {
                warn!(path = %meta_path.display(), error = %e, "Failed to read cache metadata, starting empty");
                (BTreeMap::new(), false)
            }
        };

        let store = Self {
            root,
            ttl,
            clock,
            entries: Mutex::new(entries),
        };
        if migrated {
            store.persist(&store.lock());
        }
        Ok(store)
    }

    /// Root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configured TTLs.
    pub fn ttl(&self) -> &CategoryTtl {
        &self.ttl
    }

    /// Writes `data` under `key` and records its metadata.
    ///
    /// Data write failures are returned. A metadata write failure is
    /// logged and the data file is kept.
    pub fn save(
        &self,
        key: &str,
        data: &[u8],
        category: CacheCategory,
        extension: &str,
    ) -> Result<PathBuf, CacheError> {
        if !is_valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }

        fs::create_dir_all(category_directory(&self.root, category))?;
        let path = entry_path(&self.root, category, key, extension);
        fs::write(&path, data)?;

        let entry = CacheEntry {
            category,
            timestamp: self.clock.now(),
            ttl_days: self.ttl.for_category(category),
            extension: extension.to_string(),
        };

        let mut entries = self.lock();
        if let Some(old) = entries.insert(key.to_string(), entry) {
            if old.category != category || old.extension != extension {
                remove_file_logged(&entry_path(&self.root, old.category, key, &old.extension));
            }
        }
        self.persist(&entries);

        debug!(key = key, category = %category, bytes = data.len(), "Cached entry");
        Ok(path)
    }

    /// Whether a live entry exists for the key.
    pub fn exists(&self, key: &str, category: CacheCategory, extension: &str) -> bool {
        self.get_path(key, category, extension).is_some()
    }

    /// Path of a live entry.
    ///
    /// An expired entry is evicted (file removed, metadata dropped) and
    /// reported as absent. An entry whose file has vanished is dropped too.
    pub fn get_path(&self, key: &str, category: CacheCategory, extension: &str) -> Option<PathBuf> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;
        if entry.category != category || entry.extension != extension {
            return None;
        }

        let path = entry_path(&self.root, category, key, extension);
        if entry.is_expired(self.clock.now()) {
            debug!(key = key, category = %category, "Cache entry expired");
            remove_file_logged(&path);
            entries.remove(key);
            self.persist(&entries);
            return None;
        }

        if !path.is_file() {
            warn!(key = key, path = %path.display(), "Cached file missing, dropping entry");
            entries.remove(key);
            self.persist(&entries);
            return None;
        }

        Some(path)
    }

    /// Reads a live entry's bytes.
    pub fn load(&self, key: &str, category: CacheCategory, extension: &str) -> Option<Vec<u8>> {
        let path = self.get_path(key, category, extension)?;
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read cached file");
                None
            }
        }
    }

    /// Metadata for a key, live or not.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    /// Number of entries in the metadata document.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes an entry. Returns whether it was present.
    ///
    /// A failed file deletion is logged; the metadata entry is removed
    /// regardless.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.remove(key) else {
            return false;
        };
        remove_file_logged(&entry_path(&self.root, entry.category, key, &entry.extension));
        self.persist(&entries);
        true
    }

    /// Evicts every expired entry. Returns how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();

        let expired: Vec<(String, CacheEntry)> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();

        for (key, entry) in &expired {
            remove_file_logged(&entry_path(&self.root, entry.category, key, &entry.extension));
            entries.remove(key);
        }

        if !expired.is_empty() {
            self.persist(&entries);
            info!(removed = expired.len(), "Cleared expired cache entries");
        }
        expired.len()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Rewrites the metadata document. Failures are logged and swallowed.
    fn persist(&self, entries: &BTreeMap<String, CacheEntry>) {
        let path = metadata_path(&self.root);
        let bytes = match metadata::encode(entries) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize cache metadata");
                return;
            }
        };

        let tmp = path.with_extension("json.tmp");
        let result = fs::write(&tmp, &bytes).and_then(|_| fs::rename(&tmp, &path));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to write cache metadata");
        }
    }
}

fn remove_file_logged(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete cached file"),
    }
}
