//! Runtime configuration loaded from the environment.
//!
//! All `env::var` calls live here. The binary loads an optional `.env`
//! file before calling [`load_from_env`].

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};
use sw_cache::{CacheDomain, CacheStore, JsonFileStore, SqliteStore};
use sw_core::gateway::{Credentials, Endpoints};
use sw_data::GapFillPolicy;

use crate::incremental::SyncSettings;

/// Parse an optional unsigned integer environment variable with a default.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable with a default.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Json,
    Sqlite,
}

impl std::str::FromStr for CacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(CacheBackend::Json),
            "sqlite" => Ok(CacheBackend::Sqlite),
            other => bail!("Invalid SW_CACHE_BACKEND: {other} (expected json or sqlite)"),
        }
    }
}

/// Map a `SW_GAP_FILL` value to the boundary policy of the gap-fill pass.
pub fn parse_gap_fill(s: &str) -> Result<GapFillPolicy> {
    match s.trim().to_ascii_lowercase().as_str() {
        "forward" => Ok(GapFillPolicy::default()),
        "interior" => Ok(GapFillPolicy::interior_only()),
        "hold" => Ok(GapFillPolicy::hold_both()),
        other => bail!("Invalid SW_GAP_FILL: {other} (expected forward, interior or hold)"),
    }
}

/// Strongly typed runtime configuration, immutable after loading.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absent credentials only fail commands that reach the gateway.
    pub credentials: Option<Credentials>,
    pub endpoints: Endpoints,
    pub cache_dir: PathBuf,
    pub cache_backend: CacheBackend,
    /// Length of the output window, in days before today.
    pub lookback_days: u32,
    /// A cell whose newest cached day is younger than this is not fetched.
    pub freshness_days: u32,
    pub max_concurrency: u32,
    /// Pause between the optical and the radar call of one cell.
    pub secondary_delay_ms: u32,
    pub http_timeout_secs: u32,
    pub gap_fill: GapFillPolicy,
}

/// Load configuration from environment variables with defaults.
///
/// Credentials:
/// - `COPERNICUS_CLIENT_ID`, `COPERNICUS_CLIENT_SECRET`
///
/// Optional:
/// - `SW_TOKEN_URL`, `SW_STATS_URL`, `SW_PROCESS_URL`, `SW_WEATHER_URL`
/// - `SW_CACHE_DIR` (default: `.`)
/// - `SW_CACHE_BACKEND` – `json` or `sqlite` (default: `json`)
/// - `SW_LOOKBACK_DAYS` (default: 365)
/// - `SW_FRESHNESS_DAYS` (default: 7)
/// - `SW_MAX_CONCURRENCY` (default: 4)
/// - `SW_SECONDARY_DELAY_MS` (default: 250)
/// - `SW_HTTP_TIMEOUT_SECS` (default: 60)
/// - `SW_GAP_FILL` – `forward`, `interior` or `hold` (default: `forward`)
pub fn load_from_env() -> Result<Config> {
    let credentials = match (
        env::var("COPERNICUS_CLIENT_ID").ok().filter(|v| !v.is_empty()),
        env::var("COPERNICUS_CLIENT_SECRET").ok().filter(|v| !v.is_empty()),
    ) {
        (Some(client_id), Some(client_secret)) => Some(Credentials {
            client_id,
            client_secret,
        }),
        _ => None,
    };

    let defaults = Endpoints::default();
    let endpoints = Endpoints {
        token_url: env_or!("SW_TOKEN_URL", defaults.token_url),
        stats_url: env_or!("SW_STATS_URL", defaults.stats_url),
        process_url: env_or!("SW_PROCESS_URL", defaults.process_url),
        weather_url: env_or!("SW_WEATHER_URL", defaults.weather_url),
    };

    let max_concurrency = parse_env_u32!("SW_MAX_CONCURRENCY", 4);
    if max_concurrency == 0 {
        bail!("Invalid SW_MAX_CONCURRENCY: must be at least 1");
    }

    Ok(Config {
        credentials,
        endpoints,
        cache_dir: PathBuf::from(env_or!("SW_CACHE_DIR", ".")),
        cache_backend: env_or!("SW_CACHE_BACKEND", "json").parse()?,
        lookback_days: parse_env_u32!("SW_LOOKBACK_DAYS", 365),
        freshness_days: parse_env_u32!("SW_FRESHNESS_DAYS", 7),
        max_concurrency,
        secondary_delay_ms: parse_env_u32!("SW_SECONDARY_DELAY_MS", 250),
        http_timeout_secs: parse_env_u32!("SW_HTTP_TIMEOUT_SECS", 60),
        gap_fill: parse_gap_fill(&env_or!("SW_GAP_FILL", "forward"))?,
    })
}

impl Config {
    /// Log the loaded configuration with the client secret masked.
    pub fn log_config(&self) {
        let (client_id, secret) = match &self.credentials {
            Some(c) => (c.client_id.as_str(), "****"),
            None => ("<unset>", "<unset>"),
        };
        info!("Configuration loaded:");
        info!("  COPERNICUS_CLIENT_ID     : {}", client_id);
        info!("  COPERNICUS_CLIENT_SECRET : {}", secret);
        info!("  SW_TOKEN_URL             : {}", self.endpoints.token_url);
        info!("  SW_STATS_URL             : {}", self.endpoints.stats_url);
        info!("  SW_PROCESS_URL           : {}", self.endpoints.process_url);
        info!("  SW_WEATHER_URL           : {}", self.endpoints.weather_url);
        info!("  SW_CACHE_DIR             : {}", self.cache_dir.display());
        info!("  SW_CACHE_BACKEND         : {:?}", self.cache_backend);
        info!("  SW_LOOKBACK_DAYS         : {}", self.lookback_days);
        info!("  SW_FRESHNESS_DAYS        : {}", self.freshness_days);
        info!("  SW_MAX_CONCURRENCY       : {}", self.max_concurrency);
        info!("  SW_SECONDARY_DELAY_MS    : {}", self.secondary_delay_ms);
        info!("  SW_HTTP_TIMEOUT_SECS     : {}", self.http_timeout_secs);
        info!(
            "  SW_GAP_FILL              : leading {:?}, trailing {:?}",
            self.gap_fill.leading, self.gap_fill.trailing
        );
        if self.credentials.is_none() {
            warn!("Copernicus credentials are not set; gateway commands will fail.");
        }
    }

    pub fn sync_settings(&self, today: NaiveDate) -> SyncSettings {
        SyncSettings {
            today,
            lookback_days: self.lookback_days,
            freshness_days: i64::from(self.freshness_days),
            max_concurrency: self.max_concurrency as usize,
            secondary_delay: Duration::from_millis(u64::from(self.secondary_delay_ms)),
        }
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(u64::from(self.http_timeout_secs)))
            .build()?)
    }

    /// Open the cache of one domain with the configured backend.
    pub fn open_store(&self, domain: CacheDomain) -> Result<Box<dyn CacheStore>> {
        debug!("Opening {} cache ({:?})", domain.label(), self.cache_backend);
        Ok(match self.cache_backend {
            CacheBackend::Json => Box::new(JsonFileStore::new(
                self.cache_dir.join(domain.json_file_name()),
            )),
            CacheBackend::Sqlite => Box::new(SqliteStore::open(
                self.cache_dir.join(domain.sqlite_file_name()),
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_backend_parse() {
        assert_eq!("json".parse::<CacheBackend>().unwrap(), CacheBackend::Json);
        assert_eq!(" SQLite ".parse::<CacheBackend>().unwrap(), CacheBackend::Sqlite);
        assert!("redis".parse::<CacheBackend>().is_err());
    }

    #[test]
    fn test_gap_fill_parse() {
        assert_eq!(parse_gap_fill("forward").unwrap(), GapFillPolicy::default());
        assert_eq!(parse_gap_fill(" Interior").unwrap(), GapFillPolicy::interior_only());
        assert_eq!(parse_gap_fill("HOLD").unwrap(), GapFillPolicy::hold_both());
        assert!(parse_gap_fill("linear").is_err());
    }

    #[test]
    fn test_open_store_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            credentials: None,
            endpoints: Endpoints::default(),
            cache_dir: dir.path().to_path_buf(),
            cache_backend: CacheBackend::Json,
            lookback_days: 90,
            freshness_days: 7,
            max_concurrency: 2,
            secondary_delay_ms: 0,
            http_timeout_secs: 5,
            gap_fill: GapFillPolicy::default(),
        };
        let json = config.open_store(CacheDomain::Radar).unwrap();
        assert!(json.describe().ends_with("radar_cache.json"));

        let sqlite = Config {
            cache_backend: CacheBackend::Sqlite,
            ..config.clone()
        };
        let store = sqlite.open_store(CacheDomain::Optical).unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(dir.path().join("data_cache.sqlite").exists());

        let settings = config.sync_settings(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());
        assert_eq!(settings.freshness_days, 7);
        assert_eq!(settings.secondary_delay, Duration::ZERO);
    }
}
