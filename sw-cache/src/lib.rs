//! Persistent per-cell observation cache.
//!
//! The fetch-and-merge engine only sees the [`CacheStore`] trait: the whole
//! map is read once before a batch and written once after it. Three
//! backends are provided:
//!
//! - [`JsonFileStore`] - one pretty-printed JSON document per cache domain,
//!   replaced atomically (write temp file, then rename)
//! - [`SqliteStore`] - one `(cell_id, date)`-keyed table via `rusqlite`
//! - [`MemoryStore`] - for tests and dry runs
//!
//! # Usage
//!
//! ```rust
//! use sw_cache::{load_or_empty, CacheStore, MemoryStore};
//!
//! let store = MemoryStore::default();
//! let series = load_or_empty(&store);
//! assert!(series.is_empty());
//! store.put_all(&series).unwrap();
//! ```

pub mod json_file;
pub mod memory;
pub mod sqlite;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use log::warn;
use sw_core::observation::{merge_observations, CachedSeries, RawObservation};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cache holds an invalid date: {0}")]
    Date(String),

    #[error("Cache lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Which sensor a cache holds. Each domain is persisted separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheDomain {
    Optical,
    Radar,
}

impl CacheDomain {
    pub fn label(&self) -> &'static str {
        match self {
            CacheDomain::Optical => "optical",
            CacheDomain::Radar => "radar",
        }
    }

    pub fn json_file_name(&self) -> &'static str {
        match self {
            CacheDomain::Optical => "data_cache.json",
            CacheDomain::Radar => "radar_cache.json",
        }
    }

    pub fn sqlite_file_name(&self) -> &'static str {
        match self {
            CacheDomain::Optical => "data_cache.sqlite",
            CacheDomain::Radar => "radar_cache.sqlite",
        }
    }
}

/// Key-value store from cell id to that cell's sparse series.
pub trait CacheStore: Send + Sync {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    /// The whole map. An absent store is an empty map, not an error.
    fn load(&self) -> Result<CachedSeries>;

    /// Replace the whole map.
    fn put_all(&self, series: &CachedSeries) -> Result<()>;

    /// One cell's series, empty if unknown.
    fn get(&self, cell_id: &str) -> Result<Vec<RawObservation>> {
        Ok(self.load()?.remove(cell_id).unwrap_or_default())
    }
}

/// Load a store, treating an unreadable one as empty.
///
/// Each series is re-sorted and de-duplicated by day so hand-edited or
/// legacy files still satisfy the ordering invariant.
pub fn load_or_empty(store: &dyn CacheStore) -> CachedSeries {
    match store.load() {
        Ok(series) => series
            .into_iter()
            .map(|(cell_id, observations)| (cell_id, merge_observations(&[], observations)))
            .collect(),
        Err(e) => {
            warn!(
                "Cache {} not readable ({}). A new one will be created.",
                store.describe(),
                e
            );
            CachedSeries::new()
        }
    }
}
