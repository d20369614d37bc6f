//! The seam between the pipeline and its external services.
//!
//! Everything the pipeline needs from the outside world goes through
//! [`Gateway`], so the fetch-and-merge engine can be driven by a fake in
//! tests and by `GatewaySession` (feature `api`) in production.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::GatewayError;
use crate::evalscript;
use crate::geo::{BoundingBox, Coordinate};
use crate::statistics::{StatisticsRequest, StatisticsResponse};
use sw_utils::dates::{end_of_day_utc, parse_iso_day, start_of_day_utc};

#[cfg(feature = "api")]
mod session;
#[cfg(feature = "api")]
pub use session::{Credentials, Endpoints, GatewaySession};

/// Daily mean temperature (°C) keyed by calendar day.
pub type WeatherSeries = BTreeMap<NaiveDate, f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRequest {
    pub location: Coordinate,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// A single rendered true-colour image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub bbox: BoundingBox,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Maximum scene cloud cover, percent
    pub max_cloud_coverage: u8,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Make sure a valid access token is held, fetching one if needed.
    async fn authenticate(&self) -> Result<(), GatewayError>;

    /// Per-day aggregate band statistics for one box and time range.
    async fn fetch_statistics(
        &self,
        request: &StatisticsRequest,
    ) -> Result<StatisticsResponse, GatewayError>;

    /// Daily mean temperature for one coordinate.
    async fn fetch_weather(&self, request: &WeatherRequest) -> Result<WeatherSeries, GatewayError>;

    /// A PNG image, or [`GatewayError::NoData`] when nothing cloud-free exists.
    async fn fetch_image(&self, request: &ImageRequest) -> Result<Vec<u8>, GatewayError>;
}

impl ImageRequest {
    /// JSON body for `POST /api/v1/process` rendering one PNG.
    pub fn to_body(&self) -> Value {
        json!({
            "input": {
                "bounds": { "bbox": self.bbox.as_array() },
                "data": [{
                    "type": "sentinel-2-l2a",
                    "dataFilter": {
                        "timeRange": {
                            "from": start_of_day_utc(&self.from),
                            "to": end_of_day_utc(&self.to),
                        },
                        "maxCloudCoverage": self.max_cloud_coverage,
                    },
                }],
            },
            "output": {
                "width": self.width,
                "height": self.height,
                "responses": [{
                    "identifier": "default",
                    "format": { "type": "image/png" },
                }],
            },
            "evalscript": evalscript::TRUE_COLOR,
        })
    }
}

/// The part of the Open-Meteo archive response the pipeline reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherArchive {
    #[serde(default)]
    pub daily: WeatherDaily,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherDaily {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m_mean: Vec<Option<f64>>,
}

impl WeatherArchive {
    /// Pair days with temperatures; days without a reading or with an
    /// unparsable date are left out.
    pub fn to_series(&self) -> WeatherSeries {
        self.daily
            .time
            .iter()
            .zip(self.daily.temperature_2m_mean.iter())
            .filter_map(|(time, temperature)| {
                let date = parse_iso_day(time).ok()?;
                let value = temperature.filter(|t| t.is_finite())?;
                Some((date, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    #[test]
    fn test_weather_archive_to_series() {
        let body = r#"{
          "latitude": 45.96, "longitude": 8.63,
          "daily_units": {"time": "iso8601", "temperature_2m_mean": "°C"},
          "daily": {
            "time": ["2024-07-01", "2024-07-02", "2024-07-03"],
            "temperature_2m_mean": [21.4, null, 23.0]
          }
        }"#;
        let archive: WeatherArchive = serde_json::from_str(body).unwrap();
        let series = archive.to_series();
        assert_eq!(series.len(), 2);
        assert_eq!(series.get(&day(1)), Some(&21.4));
        assert_eq!(series.get(&day(2)), None);
        assert_eq!(series.get(&day(3)), Some(&23.0));
    }

    #[test]
    fn test_image_request_body() {
        let request = ImageRequest {
            bbox: BoundingBox::new(7.70, 45.94, 7.72, 45.96),
            from: day(1),
            to: day(30),
            max_cloud_coverage: 40,
            width: 512,
            height: 512,
        };
        let body = request.to_body();
        assert_eq!(body["input"]["data"][0]["dataFilter"]["maxCloudCoverage"], 40);
        assert_eq!(body["output"]["width"], 512);
        assert_eq!(body["output"]["responses"][0]["format"]["type"], "image/png");
        assert_eq!(body["input"]["bounds"]["bbox"][0], json!(7.70));
    }
}
