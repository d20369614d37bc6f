//! Request and response shapes of the satellite statistics API, and the
//! validation that turns per-day aggregates into observations.

use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::geo::BoundingBox;
use crate::observation::RawObservation;
use crate::project::IndexKind;
use sw_utils::dates::{end_of_day_utc, parse_iso_day, start_of_day_utc};

/// Band holding the primary value in every script.
pub const PRIMARY_BAND: &str = "B0";

/// One aggregate value per calendar day over `[from, to]` for one box.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRequest {
    pub bbox: BoundingBox,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub index: IndexKind,
}

impl StatisticsRequest {
    /// JSON body for `POST /api/v1/statistics`, a 1x1 output aggregated
    /// per day.
    pub fn to_body(&self) -> Value {
        let time_range = json!({
            "from": start_of_day_utc(&self.from),
            "to": end_of_day_utc(&self.to),
        });
        let mut source = json!({
            "type": self.index.collection(),
            "dataFilter": { "timeRange": time_range },
        });
        if let Some(processing) = self.index.processing() {
            source["processing"] = processing;
        }
        json!({
            "input": {
                "bounds": { "bbox": self.bbox.as_array() },
                "data": [source],
            },
            "aggregation": {
                "evalscript": self.index.evalscript(),
                "timeRange": time_range,
                "aggregationInterval": { "of": "P1D" },
                "width": 1,
                "height": 1,
            },
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatisticsResponse {
    #[serde(default)]
    pub data: Vec<StatisticsEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsEntry {
    pub interval: Interval,
    #[serde(default)]
    pub outputs: HashMap<String, OutputStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interval {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputStats {
    #[serde(default)]
    pub bands: HashMap<String, BandStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BandStats {
    pub stats: Stats,
}

/// Per-band aggregate. The API reports NaN and infinities as strings, so
/// numeric fields accept either representation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub mean: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub st_dev: Option<f64>,
    #[serde(default)]
    pub sample_count: u64,
    #[serde(default)]
    pub no_data_count: u64,
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// A usable mean, clamped to the index range; `None` when the day had no
/// samples or the mean is missing, NaN or infinite.
pub fn valid_mean(stats: Option<&Stats>, range: Option<(f64, f64)>) -> Option<f64> {
    let stats = stats?;
    if stats.sample_count == 0 {
        return None;
    }
    let mean = stats.mean.filter(|m| m.is_finite())?;
    Some(match range {
        Some((lo, hi)) => mean.clamp(lo, hi),
        None => mean,
    })
}

impl StatisticsResponse {
    fn band<'a>(entry: &'a StatisticsEntry, output_id: &str, band: &str) -> Option<&'a Stats> {
        entry
            .outputs
            .get(output_id)
            .and_then(|o| o.bands.get(band))
            .map(|b| &b.stats)
    }

    /// Valid observations in response order. Days where neither band
    /// survives validation are dropped.
    pub fn to_observations(&self, index: IndexKind) -> Vec<RawObservation> {
        let output_id = index.output_id();
        let range = index.value_range();
        self.data
            .iter()
            .filter_map(|entry| {
                let date = match parse_iso_day(&entry.interval.from) {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("Skipping interval with bad date {}: {}", entry.interval.from, e);
                        return None;
                    }
                };
                let value = valid_mean(Self::band(entry, output_id, PRIMARY_BAND), range);
                let secondary_value = index
                    .secondary_band()
                    .and_then(|band| valid_mean(Self::band(entry, output_id, band), range));
                let observation = RawObservation::new(date, value).with_secondary(secondary_value);
                (!observation.is_empty()).then_some(observation)
            })
            .collect()
    }
}
