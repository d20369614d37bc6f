//! Band-math scripts sent to the Sentinel Hub statistics and process APIs.
//!
//! Every statistics script emits a `dataMask` output so cloud, shadow and
//! no-data pixels are excluded from the per-day aggregate; a day with no
//! valid pixel comes back with `sampleCount == 0`.

/// Normalized Difference Snow Index over Sentinel-2 L2A.
pub const NDSI: &str = r#"//VERSION=3
function setup() {
  return {
    input: [{ bands: ["B03", "B11", "SCL"], units: "DN" }],
    output: [
      { id: "index", bands: 1, sampleType: "FLOAT32" },
      { id: "dataMask", bands: 1, sampleType: "UINT8" }
    ]
  };
}
function evaluatePixel(sample) {
  let ndsi = (sample.B03 - sample.B11) / (sample.B03 + sample.B11);
  let masked = [3, 8, 9, 10].includes(sample.SCL) || (sample.B03 == 0 && sample.B11 == 0);
  return { index: [ndsi], dataMask: [masked ? 0 : 1] };
}"#;

/// Normalized Difference Chlorophyll Index; water, vegetation and bare
/// classes are kept so dense blooms are not masked out.
pub const NDCI: &str = r#"//VERSION=3
function setup() {
  return {
    input: [{ bands: ["B04", "B05", "SCL"], units: "DN" }],
    output: [
      { id: "index", bands: 1, sampleType: "FLOAT32" },
      { id: "dataMask", bands: 1, sampleType: "UINT8" }
    ]
  };
}
function evaluatePixel(sample) {
  if (![2, 4, 5, 6, 7].includes(sample.SCL)) {
    return { index: [0], dataMask: [0] };
  }
  let ndci = (sample.B05 - sample.B04) / (sample.B05 + sample.B04);
  return { index: [ndci], dataMask: [1] };
}"#;

/// NDVI in band 0 and NDMI in band 1 over vegetated pixels only.
pub const NDVI_NDMI: &str = r#"//VERSION=3
function setup() {
  return {
    input: [{ bands: ["B04", "B08", "B11", "SCL"], units: "DN" }],
    output: [
      { id: "INDICES", bands: 2, sampleType: "FLOAT32" },
      { id: "dataMask", bands: 1, sampleType: "UINT8" }
    ]
  };
}
function evaluatePixel(sample) {
  if (![4, 5].includes(sample.SCL)) {
    return { INDICES: [NaN, NaN], dataMask: [0] };
  }
  let ndvi = (sample.B08 - sample.B04) / (sample.B08 + sample.B04);
  let ndmi = (sample.B08 - sample.B11) / (sample.B08 + sample.B11);
  return { INDICES: [ndvi, ndmi], dataMask: [1] };
}"#;

/// Sentinel-1 VV backscatter in decibels.
pub const RADAR_VV_DB: &str = r#"//VERSION=3
function setup() {
  return {
    input: ["VV", "dataMask"],
    output: [
      { id: "index", bands: 1, sampleType: "FLOAT32" },
      { id: "dataMask", bands: 1, sampleType: "UINT8" }
    ]
  };
}
function evaluatePixel(sample) {
  if (sample.dataMask === 0) {
    return { index: [NaN], dataMask: [0] };
  }
  const db = 20 * Math.log10(sample.VV);
  if (!isFinite(db)) {
    return { index: [NaN], dataMask: [0] };
  }
  return { index: [db], dataMask: [1] };
}"#;

/// Cloud-masked true colour preview, transparent where SCL flags cloud,
/// shadow, saturation or water vapour.
pub const TRUE_COLOR: &str = r#"//VERSION=3
function setup() {
  return {
    input: [{ bands: ["B04", "B03", "B02", "SCL"], units: "DN" }],
    output: { bands: 4, sampleType: "UINT8" }
  };
}
function evaluatePixel(sample) {
  if ([1, 3, 6, 8, 9, 10, 11].includes(sample.SCL)) {
    return [0, 0, 0, 0];
  }
  const gain = 2.5;
  const r = Math.max(0, Math.min(255, 255 * (gain * sample.B04 / 3000)));
  const g = Math.max(0, Math.min(255, 255 * (gain * sample.B03 / 3000)));
  const b = Math.max(0, Math.min(255, 255 * (gain * sample.B02 / 3000)));
  return [r, g, b, 255];
}"#;
