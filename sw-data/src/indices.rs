//! Derived risk indices.
//!
//! Both scores are piecewise-linear in their inputs and expressed as a
//! percentage. They are computed from the filled daily values, so they
//! must be re-applied whenever an input column changes.

use sw_core::daily_point::DailyPoint;
use sw_core::project::ProjectKind;

/// Water temperature (°C) below which blooms do not develop.
pub const BLOOM_MIN_TEMPERATURE: f64 = 12.0;
/// Water temperature (°C) at which the thermal factor saturates.
pub const BLOOM_MAX_TEMPERATURE: f64 = 25.0;
/// Chlorophyll index at which the biomass factor saturates.
pub const BLOOM_SATURATION_INDEX: f64 = 0.4;

/// Vegetation index below which a vine is treated as dormant.
pub const DORMANCY_THRESHOLD: f64 = 0.25;
/// Moisture index at or above which there is no stress.
pub const MOISTURE_NO_STRESS: f64 = 0.2;
/// Moisture range over which stress ramps from 0 to 100%.
pub const MOISTURE_STRESS_SPAN: f64 = 0.3;

/// Algal bloom probability in percent from a chlorophyll index and a water
/// temperature. `None` when either input is missing.
pub fn bloom_probability(chlorophyll_index: Option<f64>, temperature: Option<f64>) -> Option<f64> {
    let (index, temperature) = (chlorophyll_index?, temperature?);

    let thermal = if temperature < BLOOM_MIN_TEMPERATURE {
        0.0
    } else if temperature > BLOOM_MAX_TEMPERATURE {
        1.0
    } else {
        (temperature - BLOOM_MIN_TEMPERATURE) / (BLOOM_MAX_TEMPERATURE - BLOOM_MIN_TEMPERATURE)
    };

    let biomass = if index <= 0.0 {
        0.0
    } else if index > BLOOM_SATURATION_INDEX {
        1.0
    } else {
        index / BLOOM_SATURATION_INDEX
    };

    Some(thermal * biomass * 100.0)
}

/// Water stress risk in percent from a vegetation and a moisture index.
/// `None` when either input is missing, 0 for dormant vegetation.
pub fn water_stress(vegetation_index: Option<f64>, moisture_index: Option<f64>) -> Option<f64> {
    let (vegetation, moisture) = (vegetation_index?, moisture_index?);
    if vegetation < DORMANCY_THRESHOLD {
        return Some(0.0);
    }
    let stress = (MOISTURE_NO_STRESS - moisture) / MOISTURE_STRESS_SPAN * 100.0;
    Some(stress.clamp(0.0, 100.0))
}

/// Recompute the derived score that applies to `kind` on every point.
pub fn apply_derived(points: &mut [DailyPoint], kind: ProjectKind) {
    match kind {
        ProjectKind::WaterQuality => {
            for p in points.iter_mut() {
                p.bloom_probability = bloom_probability(p.index_value, p.temperature);
            }
        }
        ProjectKind::Vineyard => {
            for p in points.iter_mut() {
                p.water_stress = water_stress(p.index_value, p.ndmi_value);
            }
        }
        ProjectKind::Snow => {}
    }
}
