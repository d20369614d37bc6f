use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::{CacheError, CacheStore, Result};
use sw_core::observation::CachedSeries;

/// In-process store that counts writes, so callers can check that
/// read-only cycles never persist.
#[derive(Debug, Default)]
pub struct MemoryStore {
    series: Mutex<CachedSeries>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn with_series(series: CachedSeries) -> Self {
        MemoryStore {
            series: Mutex::new(series),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `put_all` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CachedSeries {
        self.series
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl CacheStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn load(&self) -> Result<CachedSeries> {
        Ok(self.series.lock().map_err(|_| CacheError::Poisoned)?.clone())
    }

    fn put_all(&self, series: &CachedSeries) -> Result<()> {
        *self.series.lock().map_err(|_| CacheError::Poisoned)? = series.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
