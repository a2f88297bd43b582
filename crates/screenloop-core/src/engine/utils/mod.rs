//! Utility functions for the engine module.
//!
//! Random sampling over the identifier space and the summary statistics used
//! for cutoff calibration.

pub mod sampling;
pub mod stats;
