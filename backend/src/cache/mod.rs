//! Table Cache - Load each source version once and share it
//!
//! Tables are keyed by where they came from: a canonical file path, or the
//! content digest of an upload. A path entry remembers the file's size and
//! modification time and reloads when either changes.

use blake2::{Blake2b512, Digest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use crate::api::logs::{log_info, log_success};
use crate::config::LoaderOptions;
use crate::error::DataSourceResult;
use crate::loader::{load_table, load_table_from_bytes};
use crate::models::ProcedureTable;

/// Bytes of the blake2 digest kept in upload keys.
const DIGEST_BYTES: usize = 16;

/// Identity of a table source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SourceKey {
    /// Canonicalized file path
    Path(PathBuf),
    /// Hex digest of uploaded bytes
    Upload(String),
}

impl SourceKey {
    /// Key for a file on disk. Fails if the file cannot be resolved.
    pub fn for_path(path: &Path) -> DataSourceResult<Self> {
        Ok(SourceKey::Path(fs::canonicalize(path)?))
    }

    /// Key for uploaded content.
    pub fn for_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Blake2b512::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        SourceKey::Upload(
            digest[..DIGEST_BYTES]
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect(),
        )
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Path(p) => write!(f, "{}", p.display()),
            SourceKey::Upload(d) => write!(f, "upload:{}", d),
        }
    }
}

/// Size and modification time of a file when it was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> DataSourceResult<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

struct CacheEntry {
    table: Arc<ProcedureTable>,
    stamp: Option<FileStamp>,
    loaded_at: DateTime<Utc>,
    hits: AtomicU32,
}

impl CacheEntry {
    fn hit(&self) -> Arc<ProcedureTable> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Arc::clone(&self.table)
    }
}

/// Listing entry for a cached table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSource {
    pub key: SourceKey,
    pub name: String,
    pub rows: usize,
    pub loaded_at: DateTime<Utc>,
    pub hits: u32,
}

/// Shared cache of loaded tables.
///
/// Read-mostly: lookups and hit counting take the read lock, loads take the
/// write lock only to insert. Two threads missing the same key may both
/// load; the last insert wins.
pub struct TableCache {
    options: LoaderOptions,
    entries: RwLock<HashMap<SourceKey, CacheEntry>>,
}

impl TableCache {
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            options,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Table for the file at `path`, loading it on first use or when the
    /// file changed since it was cached.
    pub fn get_or_load_path(&self, path: &Path) -> DataSourceResult<Arc<ProcedureTable>> {
        if !path.exists() {
            return Err(crate::error::DataSourceError::NotFound(
                path.display().to_string(),
            ));
        }
        let key = SourceKey::for_path(path)?;
        let stamp = FileStamp::of(path)?;

        if let Some(entry) = self.read().get(&key) {
            if entry.stamp == Some(stamp) {
                return Ok(entry.hit());
            }
            log_info(format!("{} changed on disk, reloading", key));
        }

        let table = Arc::new(load_table(path, &self.options)?);
        self.insert(key, Arc::clone(&table), Some(stamp));
        Ok(table)
    }

    /// Table for uploaded bytes. Identical content reuses the cached table.
    pub fn get_or_load_bytes(
        &self,
        bytes: &[u8],
        name: &str,
    ) -> DataSourceResult<(SourceKey, Arc<ProcedureTable>)> {
        let key = SourceKey::for_bytes(bytes);
        if let Some(table) = self.get(&key) {
            log_info(format!("Upload {} already loaded as {}", name, key));
            return Ok((key, table));
        }

        let table = Arc::new(load_table_from_bytes(bytes, name, &self.options)?);
        self.insert(key.clone(), Arc::clone(&table), None);
        Ok((key, table))
    }

    /// Cached table for `key`, without touching the source.
    pub fn get(&self, key: &SourceKey) -> Option<Arc<ProcedureTable>> {
        self.read().get(key).map(CacheEntry::hit)
    }

    /// Drop one entry. Returns whether it was cached.
    pub fn invalidate(&self, key: &SourceKey) -> bool {
        let removed = self.write().remove(key).is_some();
        if removed {
            log_info(format!("Invalidated {}", key));
        }
        removed
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Cached sources, oldest first.
    pub fn list(&self) -> Vec<CachedSource> {
        let mut sources: Vec<CachedSource> = self
            .read()
            .iter()
            .map(|(key, entry)| CachedSource {
                key: key.clone(),
                name: entry.table.source.name.clone(),
                rows: entry.table.len(),
                loaded_at: entry.loaded_at,
                hits: entry.hits.load(Ordering::Relaxed),
            })
            .collect();
        sources.sort_by_key(|s| s.loaded_at);
        sources
    }

    fn insert(&self, key: SourceKey, table: Arc<ProcedureTable>, stamp: Option<FileStamp>) {
        log_success(format!("Cached {} ({} rows)", key, table.len()));
        self.write().insert(
            key,
            CacheEntry {
                table,
                stamp,
                loaded_at: Utc::now(),
                hits: AtomicU32::new(0),
            },
        );
    }

    // A poisoned lock still holds a consistent map: entries are only
    // inserted or removed whole.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SourceKey, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SourceKey, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TableCache {
    fn default() -> Self {
        Self::new(LoaderOptions::default())
    }
}
