//! Data processing for sparse satellite observations.
//!
//! This crate turns the cached per-cell series into the dense daily output
//! the dashboard charts: one [`DailyPoint`](sw_core::daily_point::DailyPoint)
//! per cell per day, gap-filled, joined with temperature and enriched with
//! the derived risk indices. Everything here is pure and deterministic.

pub mod aggregate;
pub mod indices;
pub mod interpolation;
pub mod normalize;
pub mod weather;

pub use interpolation::{BoundaryFill, GapFillPolicy};
