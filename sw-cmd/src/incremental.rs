//! Incremental fetch-and-merge: only ask the gateway for days newer than
//! what the cache already holds.
//!
//! Each cache domain is read once before a batch and written once after
//! it, and only when some cell actually changed. Cells are fetched
//! concurrently; a failure in one cell never affects its siblings.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::time::Duration;

use sw_cache::{load_or_empty, CacheStore};
use sw_core::date_range::DateRange;
use sw_core::error::GatewayError;
use sw_core::gateway::Gateway;
use sw_core::geo::AnalysisCell;
use sw_core::observation::{latest_date, merge_observations, CachedSeries, RawObservation};
use sw_core::project::IndexKind;
use sw_core::statistics::StatisticsRequest;
use sw_utils::dates::{days_between, window_start};

/// Knobs of one sync run. `today` is supplied by the caller so runs are
/// reproducible.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub today: NaiveDate,
    pub lookback_days: u32,
    pub freshness_days: i64,
    pub max_concurrency: usize,
    pub secondary_delay: Duration,
}

impl SyncSettings {
    /// `[today - lookback, today]`, inclusive.
    pub fn window(&self) -> DateRange {
        DateRange::new(window_start(self.today, self.lookback_days), self.today)
    }
}

/// What to do for one cell given its cached series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Newest cached day is within the freshness threshold.
    Fresh { last: NaiveDate },
    /// Nothing left to ask for between the cache and today.
    UpToDate,
    Fetch { from: NaiveDate, to: NaiveDate },
}

pub fn plan_fetch(cached: &[RawObservation], settings: &SyncSettings) -> FetchPlan {
    let window_start = settings.window().start();
    let from = match latest_date(cached) {
        Some(last) if days_between(last, settings.today) < settings.freshness_days => {
            return FetchPlan::Fresh { last };
        }
        Some(last) => (last + chrono::Duration::days(1)).max(window_start),
        None => window_start,
    };
    if from >= settings.today {
        FetchPlan::UpToDate
    } else {
        FetchPlan::Fetch {
            from,
            to: settings.today,
        }
    }
}

/// Result of syncing one cell in one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSync {
    pub cell_id: String,
    pub observations: Vec<RawObservation>,
    /// The merged series differs from the cached one.
    pub changed: bool,
    /// A gateway request was issued.
    pub fetched: bool,
}

pub struct SyncEngine<'a> {
    gateway: &'a dyn Gateway,
    settings: SyncSettings,
}

impl<'a> SyncEngine<'a> {
    pub fn new(gateway: &'a dyn Gateway, settings: SyncSettings) -> Self {
        SyncEngine { gateway, settings }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Bring one cell's series up to date.
    ///
    /// Only auth failures are returned as errors. Any other gateway failure
    /// is logged and the cached series is returned unchanged.
    pub async fn sync_cell(
        &self,
        cell: &AnalysisCell,
        index: IndexKind,
        cached: &[RawObservation],
    ) -> Result<CellSync, GatewayError> {
        let unchanged = |fetched| CellSync {
            cell_id: cell.cell_id.clone(),
            observations: cached.to_vec(),
            changed: false,
            fetched,
        };

        let (from, to) = match plan_fetch(cached, &self.settings) {
            FetchPlan::Fresh { last } => {
                info!("[{}] {} cache is fresh (last {}).", cell.cell_id, index.name(), last);
                return Ok(unchanged(false));
            }
            FetchPlan::UpToDate => {
                info!("[{}] {} cache is up to date.", cell.cell_id, index.name());
                return Ok(unchanged(false));
            }
            FetchPlan::Fetch { from, to } => (from, to),
        };

        info!("[{}] Fetching {} from {} to {}", cell.cell_id, index.name(), from, to);
        let request = StatisticsRequest {
            bbox: cell.bbox,
            from,
            to,
            index,
        };
        let response = match self.gateway.fetch_statistics(&request).await {
            Ok(response) => response,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("[{}] {} fetch failed, keeping cache: {}", cell.cell_id, index.name(), e);
                return Ok(unchanged(true));
            }
        };

        let incoming = response.to_observations(index);
        debug!("[{}] {} new observations", cell.cell_id, incoming.len());
        if incoming.is_empty() {
            return Ok(unchanged(true));
        }
        let merged = merge_observations(cached, incoming);
        let changed = merged.as_slice() != cached;
        Ok(CellSync {
            cell_id: cell.cell_id.clone(),
            observations: merged,
            changed,
            fetched: true,
        })
    }

    /// Sync every cell against one store.
    ///
    /// Returns the up-to-date series of the requested cells. The store is
    /// rewritten once, only if a cell changed; a failed write is logged and
    /// does not fail the run.
    pub async fn sync_cells(
        &self,
        store: &dyn CacheStore,
        cells: &[AnalysisCell],
        index: IndexKind,
    ) -> Result<CachedSeries, GatewayError> {
        let mut cache = load_or_empty(store);
        let results: Vec<Result<CellSync, GatewayError>> = stream::iter(cells)
            .map(|cell| {
                let cached = cache.get(&cell.cell_id).map(Vec::as_slice).unwrap_or(&[]);
                self.sync_cell(cell, index, cached)
            })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        let mut synced = CachedSeries::new();
        let mut dirty = false;
        for result in results {
            let cell = result?;
            if cell.changed {
                dirty = true;
                cache.insert(cell.cell_id.clone(), cell.observations.clone());
            }
            synced.insert(cell.cell_id, cell.observations);
        }
        if dirty {
            persist(store, &cache);
        }
        Ok(synced)
    }

    /// Sync the optical domain and, when `radar` is given, the radar domain
    /// for every cell.
    ///
    /// Per cell the radar call follows the optical call after the
    /// configured delay. Cells still run concurrently with each other.
    pub async fn sync_with_radar(
        &self,
        optical_store: &dyn CacheStore,
        radar_store: &dyn CacheStore,
        cells: &[AnalysisCell],
        optical: IndexKind,
    ) -> Result<(CachedSeries, CachedSeries), GatewayError> {
        let mut optical_cache = load_or_empty(optical_store);
        let mut radar_cache = load_or_empty(radar_store);

        let results: Vec<Result<(CellSync, CellSync), GatewayError>> = stream::iter(cells)
            .map(|cell| {
                let cached_optical = optical_cache.get(&cell.cell_id).map(Vec::as_slice).unwrap_or(&[]);
                let cached_radar = radar_cache.get(&cell.cell_id).map(Vec::as_slice).unwrap_or(&[]);
                async move {
                    let first = self.sync_cell(cell, optical, cached_optical).await?;
                    if first.fetched && !self.settings.secondary_delay.is_zero() {
                        tokio::time::sleep(self.settings.secondary_delay).await;
                    }
                    let second = self.sync_cell(cell, IndexKind::Radar, cached_radar).await?;
                    Ok::<_, GatewayError>((first, second))
                }
            })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        let mut optical_out = CachedSeries::new();
        let mut radar_out = CachedSeries::new();
        let (mut optical_dirty, mut radar_dirty) = (false, false);
        for result in results {
            let (o, r) = result?;
            if o.changed {
                optical_dirty = true;
                optical_cache.insert(o.cell_id.clone(), o.observations.clone());
            }
            if r.changed {
                radar_dirty = true;
                radar_cache.insert(r.cell_id.clone(), r.observations.clone());
            }
            optical_out.insert(o.cell_id, o.observations);
            radar_out.insert(r.cell_id, r.observations);
        }
        if optical_dirty {
            persist(optical_store, &optical_cache);
        }
        if radar_dirty {
            persist(radar_store, &radar_cache);
        }
        Ok((optical_out, radar_out))
    }
}

fn persist(store: &dyn CacheStore, cache: &CachedSeries) {
    match store.put_all(cache) {
        Ok(()) => info!("Cache {} updated ({} cells).", store.describe(), cache.len()),
        Err(e) => error!("Failed to write cache {}: {}", store.describe(), e),
    }
}
