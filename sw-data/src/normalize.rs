//! Expansion of sparse observations into one point per calendar day.

use chrono::NaiveDate;
use log::debug;
use std::collections::HashMap;

use crate::interpolation::{fill_gaps, GapFillPolicy};
use sw_core::daily_point::DailyPoint;
use sw_core::date_range::DateRange;
use sw_core::observation::RawObservation;

/// A gap-fillable numeric column of [`DailyPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Index,
    Ndmi,
    Radar,
    Temperature,
}

impl Field {
    fn slot(self, point: &mut DailyPoint) -> &mut Option<f64> {
        match self {
            Field::Index => &mut point.index_value,
            Field::Ndmi => &mut point.ndmi_value,
            Field::Radar => &mut point.radar_value,
            Field::Temperature => &mut point.temperature,
        }
    }
}

/// Gap-fill one column of a single cell's date-ordered series.
///
/// The `is_interpolated` flag is left alone: it describes the primary
/// index only.
pub fn fill_field(points: &mut [DailyPoint], field: Field, policy: GapFillPolicy) {
    let dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
    let mut values: Vec<Option<f64>> = points.iter_mut().map(|p| *field.slot(p)).collect();
    fill_gaps(&dates, &mut values, policy);
    for (point, value) in points.iter_mut().zip(values) {
        *field.slot(point) = value;
    }
}

/// Build the dense daily series of one cell over `window`.
///
/// Every day of the window yields exactly one point. A day is real
/// (`is_interpolated == false`) only when an observation with a primary
/// value exists for it. Primary and secondary values are then gap-filled
/// independently. Observations outside the window are ignored.
pub fn normalize(
    station_id: &str,
    cell_id: &str,
    sparse: &[RawObservation],
    window: DateRange,
    policy: GapFillPolicy,
) -> Vec<DailyPoint> {
    let by_day: HashMap<NaiveDate, &RawObservation> = sparse
        .iter()
        .filter(|o| window.contains(&o.date))
        .map(|o| (o.date, o))
        .collect();

    let mut points: Vec<DailyPoint> = window
        .map(|day| {
            let mut point = DailyPoint::placeholder(day, station_id, cell_id);
            if let Some(observation) = by_day.get(&day) {
                point.index_value = observation.value;
                point.ndmi_value = observation.secondary_value;
                point.is_interpolated = observation.value.is_none();
            }
            point
        })
        .collect();
    debug!(
        "[{}] {} real days of {}",
        cell_id,
        points.iter().filter(|p| !p.is_interpolated).count(),
        points.len()
    );

    fill_field(&mut points, Field::Index, policy);
    fill_field(&mut points, Field::Ndmi, policy);
    points
}

/// Attach a second sensor's series (radar backscatter) to one cell's
/// normalized points and gap-fill it.
pub fn attach_radar(points: &mut [DailyPoint], radar: &[RawObservation], policy: GapFillPolicy) {
    let by_day: HashMap<NaiveDate, Option<f64>> = radar.iter().map(|o| (o.date, o.value)).collect();
    for point in points.iter_mut() {
        point.radar_value = by_day.get(&point.date).copied().flatten();
    }
    fill_field(points, Field::Radar, policy);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    fn window(from: u32, to: u32) -> DateRange {
        DateRange::new(day(from), day(to))
    }

    #[test]
    fn test_end_to_end_five_day_window() {
        let sparse = vec![
            RawObservation::new(day(1), Some(0.2)),
            RawObservation::new(day(3), Some(0.4)),
            RawObservation::new(day(5), Some(0.6)),
        ];
        let points = normalize("zermatt", "zermatt", &sparse, window(1, 5), GapFillPolicy::default());
        let expected = [(0.2, false), (0.3, true), (0.4, false), (0.5, true), (0.6, false)];
        assert_eq!(points.len(), 5);
        for (point, (value, interpolated)) in points.iter().zip(expected) {
            assert!((point.index_value.unwrap() - value).abs() < 1e-9);
            assert_eq!(point.is_interpolated, interpolated);
        }
    }

    #[test]
    fn test_one_point_per_day_regardless_of_input() {
        let w = window(1, 31);
        assert_eq!(normalize("a", "a", &[], w, GapFillPolicy::default()).len(), 31);

        let sparse = vec![
            RawObservation::new(day(2), Some(0.1)),
            RawObservation::new(day(2), Some(0.1)),
            RawObservation::new(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), Some(0.9)),
        ];
        let points = normalize("a", "a", &sparse, w, GapFillPolicy::default());
        assert_eq!(points.len(), 31);
        assert_eq!(points.iter().filter(|p| !p.is_interpolated).count(), 1);
    }

    #[test]
    fn test_empty_input_yields_placeholders() {
        let points = normalize("a", "a_0", &[], window(1, 3), GapFillPolicy::hold_both());
        assert!(points.iter().all(|p| p.is_interpolated && p.index_value.is_none()));
        assert!(points.iter().all(|p| p.cell_id == "a_0" && p.station_id == "a"));
    }

    #[test]
    fn test_null_primary_is_not_real() {
        let sparse = vec![
            RawObservation::new(day(1), Some(0.5)).with_secondary(Some(0.1)),
            RawObservation::new(day(2), None).with_secondary(Some(0.3)),
            RawObservation::new(day(3), Some(0.7)).with_secondary(None),
        ];
        let points = normalize("v", "v", &sparse, window(1, 3), GapFillPolicy::default());
        assert!(points[1].is_interpolated);
        assert!((points[1].index_value.unwrap() - 0.6).abs() < 1e-9);
        // secondary band filled on its own
        assert_eq!(points[1].ndmi_value, Some(0.3));
        assert_eq!(points[2].ndmi_value, Some(0.3));
    }

    #[test]
    fn test_trailing_forward_fill() {
        let sparse = vec![RawObservation::new(day(2), Some(0.42))];
        let points = normalize("s", "s", &sparse, window(1, 4), GapFillPolicy::default());
        assert_eq!(points[0].index_value, None);
        assert_eq!(points[3].index_value, Some(0.42));
        assert!(points[3].is_interpolated);
    }

    #[test]
    fn test_deterministic() {
        let sparse = vec![
            RawObservation::new(day(4), Some(-0.2)),
            RawObservation::new(day(9), Some(0.3)),
        ];
        let a = normalize("s", "s", &sparse, window(1, 12), GapFillPolicy::default());
        let b = normalize("s", "s", &sparse, window(1, 12), GapFillPolicy::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_attach_radar() {
        let mut points = normalize("t", "t", &[], window(1, 5), GapFillPolicy::default());
        let radar = vec![
            RawObservation::new(day(1), Some(-12.0)),
            RawObservation::new(day(5), Some(-8.0)),
        ];
        attach_radar(&mut points, &radar, GapFillPolicy::default());
        assert_eq!(points[2].radar_value, Some(-10.0));
        assert!(points[2].is_interpolated);
    }
}
