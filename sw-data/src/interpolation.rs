//! Linear interpolation for filling gaps in daily series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What to do with a run of missing days that has a real value on one
/// side only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryFill {
    /// Keep the days empty.
    Leave,
    /// Repeat the nearest real value.
    Hold,
}

/// Boundary behaviour for the gap-fill pass. Interior gaps are always
/// interpolated linearly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapFillPolicy {
    /// Days before the first real value.
    pub leading: BoundaryFill,
    /// Days after the last real value.
    pub trailing: BoundaryFill,
}

impl Default for GapFillPolicy {
    /// Forward-fill the tail so the latest reading carries to today, and
    /// leave the head empty rather than inventing history.
    fn default() -> Self {
        GapFillPolicy {
            leading: BoundaryFill::Leave,
            trailing: BoundaryFill::Hold,
        }
    }
}

impl GapFillPolicy {
    /// Interior interpolation only.
    pub fn interior_only() -> Self {
        GapFillPolicy {
            leading: BoundaryFill::Leave,
            trailing: BoundaryFill::Leave,
        }
    }

    /// Hold the nearest value at both ends.
    pub fn hold_both() -> Self {
        GapFillPolicy {
            leading: BoundaryFill::Hold,
            trailing: BoundaryFill::Hold,
        }
    }
}

/// Value on `date` on the straight line through two known points.
///
/// `prev` and `next` must be on different days.
pub fn interpolate_between(prev: (NaiveDate, f64), next: (NaiveDate, f64), date: NaiveDate) -> f64 {
    let span = (next.0 - prev.0).num_days() as f64;
    let fraction = (date - prev.0).num_days() as f64 / span;
    prev.1 + fraction * (next.1 - prev.1)
}

/// Fill every `None` in `values` in place.
///
/// `dates` and `values` are parallel slices sorted by date. A gap with real
/// values on both sides is interpolated by elapsed days, so uneven spacing
/// is respected. Gaps at either end follow `policy`. A series with no real
/// value stays empty.
pub fn fill_gaps(dates: &[NaiveDate], values: &mut [Option<f64>], policy: GapFillPolicy) {
    debug_assert_eq!(dates.len(), values.len());
    let known: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|_| i))
        .collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return;
    };

    for pair in known.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b - a <= 1 {
            continue;
        }
        if let (Some(va), Some(vb)) = (values[a], values[b]) {
            for i in a + 1..b {
                values[i] = Some(interpolate_between((dates[a], va), (dates[b], vb), dates[i]));
            }
        }
    }

    if policy.leading == BoundaryFill::Hold {
        let held = values[first];
        values[..first].iter_mut().for_each(|v| *v = held);
    }
    if policy.trailing == BoundaryFill::Hold {
        let held = values[last];
        values[last + 1..].iter_mut().for_each(|v| *v = held);
    }
}
