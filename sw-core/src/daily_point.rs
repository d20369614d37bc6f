use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::observation::iso_day;

/// Station id used for the lake-wide aggregate series and its KPI.
pub const LAKE_AVERAGE_ID: &str = "lake-average";

/// One calendar day of one station/cell in the output window.
///
/// `is_interpolated` is false exactly when the day had a real observation
/// with a primary value; every other field may have been gap-filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    #[serde(with = "iso_day")]
    pub date: NaiveDate,
    pub station_id: String,
    pub cell_id: String,
    pub index_value: Option<f64>,
    pub is_interpolated: bool,
    pub temperature: Option<f64>,
    pub ndmi_value: Option<f64>,
    pub radar_value: Option<f64>,
    pub bloom_probability: Option<f64>,
    pub water_stress: Option<f64>,
    pub spatial_coverage: Option<f64>,
}

impl DailyPoint {
    /// An empty placeholder for a day without an observation.
    pub fn placeholder(date: NaiveDate, station_id: &str, cell_id: &str) -> Self {
        DailyPoint {
            date,
            station_id: station_id.to_string(),
            cell_id: cell_id.to_string(),
            index_value: None,
            is_interpolated: true,
            temperature: None,
            ndmi_value: None,
            radar_value: None,
            bloom_probability: None,
            water_stress: None,
            spatial_coverage: None,
        }
    }

    /// A real, non-interpolated reading.
    pub fn is_real(&self) -> bool {
        !self.is_interpolated && self.index_value.is_some()
    }
}

/// Latest real reading of a station or aggregate, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub station_id: String,
    pub name: String,
    pub latest_index_value: Option<f64>,
    pub latest_ndmi_value: Option<f64>,
    pub latest_date: Option<NaiveDate>,
    pub spatial_coverage: Option<f64>,
}
