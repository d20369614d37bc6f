//! Core types for the sentinel watch data-fusion pipeline.
//!
//! Monitoring points and projects, the geo-cell resolver, the sparse
//! observation model shared by every cache backend, the dashboard-facing
//! daily output, and the gateway seam to the satellite, weather and image
//! services. The HTTP implementation of that seam is behind the `api`
//! feature so the pure parts build without a TLS stack.

pub mod daily_point;
pub mod date_range;
pub mod error;
pub mod evalscript;
pub mod gateway;
pub mod geo;
pub mod observation;
pub mod project;
pub mod statistics;
pub mod token;
