use log::debug;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{CacheStore, Result};
use sw_core::observation::CachedSeries;

/// The whole cache as one JSON document:
/// `{"cell_id": [{"date": "2024-05-01", "value": 0.1}, ...], ...}`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CacheStore for JsonFileStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<CachedSeries> {
        if !self.path.exists() {
            return Ok(CachedSeries::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Written to a sibling temp file, flushed, then renamed over the
    /// target so a crash never leaves a truncated cache.
    fn put_all(&self, series: &CachedSeries) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_vec_pretty(series)?;
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        debug!("Cache file {} updated.", self.path.display());
        Ok(())
    }
}
