//! One full refresh of a project: sync caches, build the daily series,
//! join weather, derive indices and summarize.

use chrono::{Duration as TimeDelta, NaiveDate};
use log::{error, info, warn};
use serde::Serialize;

use crate::incremental::{SyncEngine, SyncSettings};
use sw_cache::CacheStore;
use sw_core::daily_point::{DailyPoint, KpiSummary};
use sw_core::error::GatewayError;
use sw_core::gateway::{Gateway, ImageRequest, WeatherRequest, WeatherSeries};
use sw_core::geo::{resolve_cells, AnalysisCell, BoundingBox};
use sw_core::observation::CachedSeries;
use sw_core::project::{MonitoringPoint, Project, ProjectKind};
use sw_data::aggregate::{kpi_summaries, lake_average};
use sw_data::indices::apply_derived;
use sw_data::normalize::{attach_radar, fill_field, normalize, Field};
use sw_data::weather::join_weather;
use sw_data::GapFillPolicy;

pub const VISUAL_LOOKBACK_DAYS: i64 = 60;
pub const VISUAL_MAX_CLOUD_COVERAGE: u8 = 40;
pub const VISUAL_SIZE: u32 = 512;
pub const VISUAL_BUFFER_KM: f64 = 0.5;

/// Everything the dashboard needs for one project.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReport {
    pub project_id: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub points: Vec<DailyPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Vec<DailyPoint>>,
    pub kpis: Vec<KpiSummary>,
}

pub struct Pipeline<'a> {
    gateway: &'a dyn Gateway,
    optical_store: &'a dyn CacheStore,
    radar_store: &'a dyn CacheStore,
    settings: SyncSettings,
    policy: GapFillPolicy,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        gateway: &'a dyn Gateway,
        optical_store: &'a dyn CacheStore,
        radar_store: &'a dyn CacheStore,
        settings: SyncSettings,
    ) -> Self {
        Pipeline {
            gateway,
            optical_store,
            radar_store,
            settings,
            policy: GapFillPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: GapFillPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the whole pipeline for `project`.
    ///
    /// Auth failures abort the run. Gateway failures for single cells or
    /// for weather only degrade the output to cached or empty data.
    pub async fn run_project(&self, project: &Project) -> Result<ProjectReport, GatewayError> {
        self.gateway.authenticate().await?;

        let window = self.settings.window();
        let cells: Vec<AnalysisCell> = project
            .stations
            .iter()
            .flat_map(|station| resolve_cells(station, project))
            .collect();
        info!(
            "Project {}: {} stations, {} cells, window {} to {}",
            project.id,
            project.stations.len(),
            cells.len(),
            window.start(),
            window.end()
        );

        let weather = self.representative_weather(project).await?;

        let engine = SyncEngine::new(self.gateway, self.settings.clone());
        let optical_index = project.kind.optical_index();
        let (optical, radar) = if project.kind.uses_radar() {
            engine
                .sync_with_radar(self.optical_store, self.radar_store, &cells, optical_index)
                .await?
        } else {
            let optical = engine.sync_cells(self.optical_store, &cells, optical_index).await?;
            (optical, CachedSeries::new())
        };

        let mut points = Vec::with_capacity(cells.len() * window.num_days());
        for cell in &cells {
            let sparse = optical.get(&cell.cell_id).map(Vec::as_slice).unwrap_or(&[]);
            let mut series = normalize(&cell.station_id, &cell.cell_id, sparse, window, self.policy);
            if project.kind.uses_radar() {
                let radar_series = radar.get(&cell.cell_id).map(Vec::as_slice).unwrap_or(&[]);
                attach_radar(&mut series, radar_series, self.policy);
            }
            join_weather(&mut series, &weather);
            fill_field(&mut series, Field::Temperature, self.policy);
            apply_derived(&mut series, project.kind);
            points.extend(series);
        }

        let aggregate = match project.kind {
            ProjectKind::WaterQuality => Some(lake_average(&points, self.policy)),
            _ => None,
        };
        let kpis = kpi_summaries(project, &points, aggregate.as_deref());
        info!("Project {}: {} daily points", project.id, points.len());

        Ok(ProjectReport {
            project_id: project.id.clone(),
            window_start: window.start(),
            window_end: window.end(),
            points,
            aggregate,
            kpis,
        })
    }

    /// One weather series for the whole project, taken at its first
    /// station. Non-fatal failures yield an empty series.
    async fn representative_weather(&self, project: &Project) -> Result<WeatherSeries, GatewayError> {
        let Some(station) = project.representative_station() else {
            return Ok(WeatherSeries::new());
        };
        let window = self.settings.window();
        let request = WeatherRequest {
            location: station.location,
            start: window.start(),
            end: window.end(),
        };
        match self.gateway.fetch_weather(&request).await {
            Ok(series) => Ok(series),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Weather for {} unavailable: {}", station.id, e);
                Ok(WeatherSeries::new())
            }
        }
    }
}

/// Latest cloud-free true-colour PNG around `station`, or `None` when
/// nothing usable exists in the last 60 days.
///
/// Only auth failures are returned as errors.
pub async fn latest_visual(
    gateway: &dyn Gateway,
    station: &MonitoringPoint,
    today: NaiveDate,
) -> Result<Option<Vec<u8>>, GatewayError> {
    gateway.authenticate().await?;
    let request = ImageRequest {
        bbox: BoundingBox::around(station.location, VISUAL_BUFFER_KM),
        from: today - TimeDelta::days(VISUAL_LOOKBACK_DAYS),
        to: today,
        max_cloud_coverage: VISUAL_MAX_CLOUD_COVERAGE,
        width: VISUAL_SIZE,
        height: VISUAL_SIZE,
    };
    match gateway.fetch_image(&request).await {
        Ok(png) => Ok(Some(png)),
        Err(GatewayError::NoData) => {
            warn!(
                "No cloud-free visual found for {} in the last {} days.",
                station.id, VISUAL_LOOKBACK_DAYS
            );
            Ok(None)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!("Failed to fetch latest visual for {}: {}", station.id, e);
            Ok(None)
        }
    }
}
