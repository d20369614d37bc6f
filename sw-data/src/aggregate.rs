//! Project-level views over the per-cell daily series.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::indices::bloom_probability;
use crate::normalize::{fill_field, Field};
use crate::GapFillPolicy;
use sw_core::daily_point::{DailyPoint, KpiSummary, LAKE_AVERAGE_ID};
use sw_core::project::Project;

pub const LAKE_AVERAGE_NAME: &str = "Lake average";

#[derive(Default)]
struct DayTotals {
    sum: f64,
    valid: usize,
    total: usize,
    temperature: Option<f64>,
}

/// Lake-wide daily mean of every real cell reading.
///
/// A day's `spatial_coverage` is the share of cells (in percent) that had
/// a real reading. Days without any are gap-filled like a single station
/// and marked interpolated. Bloom probability is computed on the filled
/// mean.
pub fn lake_average(points: &[DailyPoint], policy: GapFillPolicy) -> Vec<DailyPoint> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
    for p in points {
        let totals = days.entry(p.date).or_default();
        totals.total += 1;
        if p.is_real() {
            if let Some(v) = p.index_value {
                totals.sum += v;
                totals.valid += 1;
            }
        }
        if totals.temperature.is_none() {
            totals.temperature = p.temperature;
        }
    }

    let mut series: Vec<DailyPoint> = days
        .into_iter()
        .map(|(date, t)| {
            let mut point = DailyPoint::placeholder(date, LAKE_AVERAGE_ID, LAKE_AVERAGE_ID);
            point.temperature = t.temperature;
            point.spatial_coverage = Some(t.valid as f64 / t.total as f64 * 100.0);
            if t.valid > 0 {
                point.index_value = Some(t.sum / t.valid as f64);
                point.is_interpolated = false;
            }
            point
        })
        .collect();

    fill_field(&mut series, Field::Index, policy);
    for p in series.iter_mut() {
        p.bloom_probability = bloom_probability(p.index_value, p.temperature);
    }
    series
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Latest real reading of one series of points, averaged over the cells
/// that reported on that day.
fn latest_real(points: &[&DailyPoint]) -> Option<(NaiveDate, Option<f64>, Option<f64>)> {
    let latest = points.iter().filter(|p| p.is_real()).map(|p| p.date).max()?;
    let on_day: Vec<&&DailyPoint> = points
        .iter()
        .filter(|p| p.date == latest && p.is_real())
        .collect();
    Some((
        latest,
        mean(on_day.iter().filter_map(|p| p.index_value)),
        mean(on_day.iter().filter_map(|p| p.ndmi_value)),
    ))
}

/// One KPI per station, plus one for `aggregate` when given.
///
/// Interpolated days never count as the latest reading. A station with no
/// real reading in the window still gets an entry with empty values.
pub fn kpi_summaries(
    project: &Project,
    points: &[DailyPoint],
    aggregate: Option<&[DailyPoint]>,
) -> Vec<KpiSummary> {
    let mut summaries: Vec<KpiSummary> = project
        .stations
        .iter()
        .map(|station| {
            let own: Vec<&DailyPoint> = points.iter().filter(|p| p.station_id == station.id).collect();
            let latest = latest_real(&own);
            KpiSummary {
                station_id: station.id.clone(),
                name: station.name.clone(),
                latest_index_value: latest.and_then(|l| l.1),
                latest_ndmi_value: latest.and_then(|l| l.2),
                latest_date: latest.map(|l| l.0),
                spatial_coverage: None,
            }
        })
        .collect();

    if let Some(aggregate) = aggregate {
        let latest = aggregate.iter().filter(|p| p.is_real()).max_by_key(|p| p.date);
        summaries.push(KpiSummary {
            station_id: LAKE_AVERAGE_ID.to_string(),
            name: LAKE_AVERAGE_NAME.to_string(),
            latest_index_value: latest.and_then(|p| p.index_value),
            latest_ndmi_value: None,
            latest_date: latest.map(|p| p.date),
            spatial_coverage: latest.and_then(|p| p.spatial_coverage),
        });
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use sw_core::geo::Coordinate;
    use sw_core::project::{MonitoringPoint, ProjectKind};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn point(d: u32, station: &str, value: Option<f64>) -> DailyPoint {
        let mut p = DailyPoint::placeholder(day(d), station, station);
        p.index_value = value;
        p.is_interpolated = value.is_none();
        p.temperature = Some(20.0);
        p
    }

    fn lake() -> Project {
        let station = |id: &str| MonitoringPoint {
            id: id.to_string(),
            name: format!("Point {id}"),
            location: Coordinate { lat: 45.9, lng: 8.6 },
            grid: None,
        };
        Project {
            id: "maggiore-lake".into(),
            name: "Lake Maggiore".into(),
            description: String::new(),
            kind: ProjectKind::WaterQuality,
            stations: vec![station("m0"), station("m1")],
        }
    }

    #[test]
    fn test_lake_average_and_coverage() {
        let points = vec![
            point(1, "m0", Some(0.1)),
            point(1, "m1", Some(0.3)),
            point(2, "m0", Some(0.4)),
            point(2, "m1", None),
            point(3, "m0", None),
            point(3, "m1", None),
        ];
        let avg = lake_average(&points, GapFillPolicy::default());
        assert_eq!(avg.len(), 3);
        assert!((avg[0].index_value.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(avg[0].spatial_coverage, Some(100.0));
        assert_eq!(avg[1].index_value, Some(0.4));
        assert_eq!(avg[1].spatial_coverage, Some(50.0));
        assert!(!avg[1].is_interpolated);
        // no cell reported; trailing value held
        assert_eq!(avg[2].spatial_coverage, Some(0.0));
        assert!(avg[2].is_interpolated);
        assert_eq!(avg[2].index_value, Some(0.4));
        assert!(avg.iter().all(|p| p.station_id == LAKE_AVERAGE_ID));
        // 0.4 at 20 °C
        assert!((avg[1].bloom_probability.unwrap() - 61.538).abs() < 0.01);
    }

    #[test]
    fn test_interpolated_readings_do_not_count() {
        let mut filled = point(2, "m0", Some(0.9));
        filled.is_interpolated = true;
        let points = vec![point(1, "m0", Some(0.1)), point(1, "m1", None), filled];
        let avg = lake_average(&points, GapFillPolicy::interior_only());
        assert_eq!(avg[0].index_value, Some(0.1));
        assert_eq!(avg[1].index_value, None);
    }

    #[test]
    fn test_kpi_summaries() {
        let mut filled = point(3, "m0", Some(0.5));
        filled.is_interpolated = true;
        let points = vec![
            point(1, "m0", Some(0.1)),
            point(2, "m0", Some(0.2)),
            filled,
            point(1, "m1", None),
        ];
        let avg = lake_average(&points, GapFillPolicy::default());
        let kpis = kpi_summaries(&lake(), &points, Some(&avg));
        assert_eq!(kpis.len(), 3);

        assert_eq!(kpis[0].station_id, "m0");
        assert_eq!(kpis[0].latest_date, Some(day(2)));
        assert_eq!(kpis[0].latest_index_value, Some(0.2));

        assert_eq!(kpis[1].latest_date, None);
        assert_eq!(kpis[1].latest_index_value, None);

        assert_eq!(kpis[2].station_id, LAKE_AVERAGE_ID);
        assert_eq!(kpis[2].latest_date, Some(day(2)));
        assert_eq!(kpis[2].spatial_coverage, Some(100.0));
    }

    #[test]
    fn test_kpi_averages_grid_cells() {
        let mut a = point(4, "m0", Some(0.2));
        a.cell_id = "m0_0".into();
        a.ndmi_value = Some(0.1);
        let mut b = point(4, "m0", Some(0.4));
        b.cell_id = "m0_1".into();
        b.ndmi_value = Some(0.3);
        let kpis = kpi_summaries(&lake(), &[a, b], None);
        assert_eq!(kpis.len(), 2);
        assert!((kpis[0].latest_index_value.unwrap() - 0.3).abs() < 1e-9);
        assert!((kpis[0].latest_ndmi_value.unwrap() - 0.2).abs() < 1e-9);
    }
}
