//! AQI computation crate.
//!
//! Converts raw pollutant concentrations into a standardized index using
//! piecewise-linear interpolation over regulatory breakpoint tables.

pub mod breakpoints;
pub mod calculator;

pub use breakpoints::{Breakpoint, BreakpointTable, PollutantTable};
pub use calculator::{validate_readings, AqiCalculator};
