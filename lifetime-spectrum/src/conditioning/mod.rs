//! Median smoothing and baseline subtraction of raw voltage traces.
mod baseline;
mod median;
mod window;

use pulse_lifetime_common::Real;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use baseline::{baseline_correct, baseline_windows};
pub use median::median_filter;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConditioningError {
    #[error(
        "Baseline windows for start cell {start_cell} and cell region {cell_region} do not fit a trace of {len} samples"
    )]
    BaselineWindow {
        start_cell: usize,
        cell_region: usize,
        len: usize,
    },
}

/// Which conditioning steps are applied to a trace, and their parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConditioningSettings {
    pub median_filter: bool,
    pub window_size: usize,
    pub correct_for_baseline: bool,
    pub start_cell: usize,
    pub cell_region: usize,
}

impl Default for ConditioningSettings {
    fn default() -> Self {
        Self {
            median_filter: true,
            window_size: 5,
            correct_for_baseline: true,
            start_cell: 10,
            cell_region: 150,
        }
    }
}

/// Applies the median filter, then baseline correction, as enabled by `settings`.
pub fn condition(
    voltage: &[Real],
    settings: &ConditioningSettings,
) -> Result<Vec<Real>, ConditioningError> {
    let filtered = if settings.median_filter {
        median_filter(voltage, settings.window_size)
    } else {
        voltage.to_vec()
    };
    if settings.correct_for_baseline {
        baseline_correct(&filtered, settings.start_cell, settings.cell_region)
    } else {
        Ok(filtered)
    }
}
