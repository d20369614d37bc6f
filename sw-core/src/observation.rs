use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One real (non-interpolated) measurement for one analysis cell on one day.
///
/// Serialized as the cache file entry:
/// `{"date": "2024-05-01", "value": 0.12, "secondaryValue": -0.05}`.
/// Older caches that wrote full timestamps and `ndmiValue` still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    #[serde(with = "iso_day")]
    pub date: NaiveDate,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, alias = "ndmiValue", skip_serializing_if = "Option::is_none")]
    pub secondary_value: Option<f64>,
}

impl RawObservation {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        RawObservation {
            date,
            value,
            secondary_value: None,
        }
    }

    pub fn with_secondary(mut self, secondary_value: Option<f64>) -> Self {
        self.secondary_value = secondary_value;
        self
    }

    /// Neither band carried a usable value.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.secondary_value.is_none()
    }
}

/// Cell id to its date-ordered sparse series. A `BTreeMap` keeps the
/// serialized cache stable between runs.
pub type CachedSeries = BTreeMap<String, Vec<RawObservation>>;

/// Most recent observation date in a series.
pub fn latest_date(series: &[RawObservation]) -> Option<NaiveDate> {
    series.iter().map(|o| o.date).max()
}

/// Merge `incoming` into `existing` keyed by calendar day.
///
/// An incoming observation replaces a cached one for the same day. The
/// result has no duplicate dates and is sorted ascending, whatever order
/// either input was in.
pub fn merge_observations(
    existing: &[RawObservation],
    incoming: impl IntoIterator<Item = RawObservation>,
) -> Vec<RawObservation> {
    let mut by_day: BTreeMap<NaiveDate, RawObservation> = existing
        .iter()
        .map(|o| (o.date, o.clone()))
        .collect();
    for observation in incoming {
        by_day.insert(observation.date, observation);
    }
    by_day.into_values().collect()
}

/// Serde adapter writing `YYYY-MM-DD` and reading any ISO-8601 day or
/// timestamp.
pub mod iso_day {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use sw_utils::dates::{format_date, parse_iso_day};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_date(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_iso_day(&raw).map_err(|e| de::Error::custom(format!("invalid date '{raw}': {e}")))
    }
}
