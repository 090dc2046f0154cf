use crate::{
    accumulator::{PulseHeightWindow, StartStop},
    cfd::{Interpolation, TimingSettings},
    conditioning::{ConditioningError, ConditioningSettings, baseline_windows},
};
use anyhow::{Error, anyhow};
use clap::{Parser, Subcommand};
use pulse_lifetime_common::{Detector, Polarity, Real};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Median window size {size} of detector {detector} must be odd")]
    MedianWindow { detector: Detector, size: usize },
    #[error("Detector {detector}: {source}")]
    Baseline {
        detector: Detector,
        #[source]
        source: ConditioningError,
    },
    #[error("CFD level {level} of detector {detector} must lie in (0, 100]")]
    CfdLevel { detector: Detector, level: Real },
    #[error("Pulse height window [{lower}, {upper}] is empty")]
    PulseHeightWindow { lower: Real, upper: Real },
    #[error("Bin width must be positive, got {0}")]
    BinWidth(Real),
    #[error("Number of bins must be positive")]
    NumberOfBins,
    #[error("At least two spline render points are required, got {0}")]
    RenderPoints(usize),
}

/// Conditioning and timing parameters of one detector channel.
///
/// The classifier copy of each trace is conditioned with `conditioning`. The timing copy
/// uses the same baseline settings, but its own median filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ChannelSettings {
    pub conditioning: ConditioningSettings,
    pub timing_median_filter: bool,
    pub timing_window_size: usize,
    /// Constant-fraction level, in percent.
    pub cfd_level: Real,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            conditioning: ConditioningSettings::default(),
            timing_median_filter: true,
            timing_window_size: 5,
            cfd_level: 25.0,
        }
    }
}

impl ChannelSettings {
    pub fn timing_conditioning(&self) -> ConditioningSettings {
        ConditioningSettings {
            median_filter: self.timing_median_filter,
            window_size: self.timing_window_size,
            ..self.conditioning.clone()
        }
    }

    fn validate(&self, detector: Detector, number_of_cells: usize) -> Result<(), ConfigError> {
        for settings in [&self.conditioning, &self.timing_conditioning()] {
            if settings.median_filter && settings.window_size % 2 == 0 {
                return Err(ConfigError::MedianWindow {
                    detector,
                    size: settings.window_size,
                });
            }
        }
        if self.conditioning.correct_for_baseline {
            baseline_windows(
                number_of_cells,
                self.conditioning.start_cell,
                self.conditioning.cell_region,
            )
            .map_err(|source| ConfigError::Baseline { detector, source })?;
        }
        if self.cfd_level.is_nan() || self.cfd_level <= 0.0 || self.cfd_level > 100.0 {
            return Err(ConfigError::CfdLevel {
                detector,
                level: self.cfd_level,
            });
        }
        Ok(())
    }
}

/// Everything that determines how a stream is turned into a spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RunConfig {
    pub polarity: Polarity,
    pub channel_a: ChannelSettings,
    pub channel_b: ChannelSettings,
    pub start_stop: StartStop,
    pub start_window: PulseHeightWindow,
    pub stop_window: PulseHeightWindow,
    pub interpolation: Interpolation,
    pub bin_width_ps: Real,
    pub number_of_bins: usize,
    pub offset_ps: Real,
    /// Persist the spectrum every this many counts. Zero persists only at the end.
    pub checkpoint_interval: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            polarity: Polarity::Negative,
            channel_a: ChannelSettings::default(),
            channel_b: ChannelSettings::default(),
            start_stop: StartStop::BStartAStop,
            start_window: PulseHeightWindow::new(250.0, 450.0),
            stop_window: PulseHeightWindow::new(50.0, 150.0),
            interpolation: Interpolation::default(),
            bin_width_ps: 5.0,
            number_of_bins: 28000,
            offset_ps: 0.0,
            checkpoint_interval: 100,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    pub fn channel(&self, detector: Detector) -> &ChannelSettings {
        match detector {
            Detector::A => &self.channel_a,
            Detector::B => &self.channel_b,
        }
    }

    pub fn timing(&self) -> TimingSettings {
        TimingSettings {
            polarity: self.polarity,
            interpolation: self.interpolation,
        }
    }

    /// Checks every parameter against a stream whose pulses have `number_of_cells` samples.
    pub fn validate(&self, number_of_cells: usize) -> Result<(), ConfigError> {
        for detector in [Detector::A, Detector::B] {
            self.channel(detector).validate(detector, number_of_cells)?;
        }
        for window in [self.start_window, self.stop_window] {
            if window.lower.is_nan() || window.upper.is_nan() || window.lower > window.upper {
                return Err(ConfigError::PulseHeightWindow {
                    lower: window.lower,
                    upper: window.upper,
                });
            }
        }
        if self.bin_width_ps.is_nan() || self.bin_width_ps <= 0.0 {
            return Err(ConfigError::BinWidth(self.bin_width_ps));
        }
        if self.number_of_bins == 0 {
            return Err(ConfigError::NumberOfBins);
        }
        if let Interpolation::CubicSpline { render_points } = self.interpolation {
            if render_points < 2 {
                return Err(ConfigError::RenderPoints(render_points));
            }
        }
        Ok(())
    }
}

impl FromStr for PulseHeightWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vals: Vec<_> = s.split(',').collect();
        if vals.len() == 2 {
            Ok(PulseHeightWindow::new(
                Real::from_str(vals[0].trim())?,
                Real::from_str(vals[1].trim())?,
            ))
        } else {
            Err(anyhow!(
                "Incorrect number of parameters in pulse height window, expected pattern 'lower,upper', got '{s}'"
            ))
        }
    }
}

#[derive(Default, Debug, Clone, Parser)]
pub struct RunParameters {
    /// Pulse-pair stream to read.
    #[clap(long)]
    pub input: PathBuf,

    /// Spectrum file, rewritten at every checkpoint.
    #[clap(long)]
    pub output: PathBuf,

    /// JSON run configuration. Options given on the command line take precedence.
    #[clap(long)]
    pub config: Option<PathBuf>,

    #[clap(long)]
    pub polarity: Option<Polarity>,

    #[clap(long)]
    pub start_stop: Option<StartStop>,

    /// Constant-fraction level of detector A, in percent.
    #[clap(long)]
    pub cfd_level_a: Option<Real>,

    /// Constant-fraction level of detector B, in percent.
    #[clap(long)]
    pub cfd_level_b: Option<Real>,

    /// Median window of detector A's classifier copy, enables the filter.
    #[clap(long, conflicts_with = "no_median_a")]
    pub median_window_a: Option<usize>,

    /// Median window of detector B's classifier copy, enables the filter.
    #[clap(long, conflicts_with = "no_median_b")]
    pub median_window_b: Option<usize>,

    #[clap(long)]
    pub no_median_a: bool,

    #[clap(long)]
    pub no_median_b: bool,

    /// Median window of detector A's timing copy, enables the filter.
    #[clap(long, conflicts_with = "no_timing_median_a")]
    pub timing_window_a: Option<usize>,

    /// Median window of detector B's timing copy, enables the filter.
    #[clap(long, conflicts_with = "no_timing_median_b")]
    pub timing_window_b: Option<usize>,

    #[clap(long)]
    pub no_timing_median_a: bool,

    #[clap(long)]
    pub no_timing_median_b: bool,

    /// First cell of detector A's baseline windows.
    #[clap(long)]
    pub start_cell_a: Option<usize>,

    /// First cell of detector B's baseline windows.
    #[clap(long)]
    pub start_cell_b: Option<usize>,

    /// End cell of detector A's leading baseline window.
    #[clap(long)]
    pub cell_region_a: Option<usize>,

    /// End cell of detector B's leading baseline window.
    #[clap(long)]
    pub cell_region_b: Option<usize>,

    #[clap(long)]
    pub no_baseline_a: bool,

    #[clap(long)]
    pub no_baseline_b: bool,

    /// Absolute amplitude window of the start pulse, in mV, as 'lower,upper'.
    #[clap(long)]
    pub phs_start: Option<PulseHeightWindow>,

    /// Absolute amplitude window of the stop pulse, in mV, as 'lower,upper'.
    #[clap(long)]
    pub phs_stop: Option<PulseHeightWindow>,

    /// Interpolate crossings linearly between samples instead of on a cubic spline.
    #[clap(long)]
    pub linear: bool,

    #[clap(long, conflicts_with = "linear")]
    pub render_points: Option<usize>,

    #[clap(long)]
    pub bin_width_ps: Option<Real>,

    #[clap(long)]
    pub number_of_bins: Option<usize>,

    #[clap(long)]
    pub offset_ps: Option<Real>,

    #[clap(long)]
    pub checkpoint_interval: Option<u64>,

    /// Reference shape classifier of detector A. Every pulse is accepted if omitted.
    #[clap(long)]
    pub reference_shape_a: Option<PathBuf>,

    /// Reference shape classifier of detector B. Every pulse is accepted if omitted.
    #[clap(long)]
    pub reference_shape_b: Option<PathBuf>,
}

/// Command line settings of one detector channel.
struct ChannelOverrides {
    cfd_level: Option<Real>,
    median_window: Option<usize>,
    no_median: bool,
    timing_window: Option<usize>,
    no_timing_median: bool,
    start_cell: Option<usize>,
    cell_region: Option<usize>,
    no_baseline: bool,
}

impl ChannelOverrides {
    fn apply(&self, channel: &mut ChannelSettings) {
        if let Some(level) = self.cfd_level {
            channel.cfd_level = level;
        }
        if let Some(size) = self.median_window {
            channel.conditioning.median_filter = true;
            channel.conditioning.window_size = size;
        }
        if self.no_median {
            channel.conditioning.median_filter = false;
        }
        if let Some(size) = self.timing_window {
            channel.timing_median_filter = true;
            channel.timing_window_size = size;
        }
        if self.no_timing_median {
            channel.timing_median_filter = false;
        }
        if let Some(start_cell) = self.start_cell {
            channel.conditioning.start_cell = start_cell;
        }
        if let Some(cell_region) = self.cell_region {
            channel.conditioning.cell_region = cell_region;
        }
        if self.no_baseline {
            channel.conditioning.correct_for_baseline = false;
        }
    }
}

impl RunParameters {
    fn channel_overrides(&self, detector: Detector) -> ChannelOverrides {
        match detector {
            Detector::A => ChannelOverrides {
                cfd_level: self.cfd_level_a,
                median_window: self.median_window_a,
                no_median: self.no_median_a,
                timing_window: self.timing_window_a,
                no_timing_median: self.no_timing_median_a,
                start_cell: self.start_cell_a,
                cell_region: self.cell_region_a,
                no_baseline: self.no_baseline_a,
            },
            Detector::B => ChannelOverrides {
                cfd_level: self.cfd_level_b,
                median_window: self.median_window_b,
                no_median: self.no_median_b,
                timing_window: self.timing_window_b,
                no_timing_median: self.no_timing_median_b,
                start_cell: self.start_cell_b,
                cell_region: self.cell_region_b,
                no_baseline: self.no_baseline_b,
            },
        }
    }

    /// The configuration file, or the defaults, overridden by command line options.
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(polarity) = self.polarity {
            config.polarity = polarity;
        }
        if let Some(start_stop) = self.start_stop {
            config.start_stop = start_stop;
        }
        self.channel_overrides(Detector::A).apply(&mut config.channel_a);
        self.channel_overrides(Detector::B).apply(&mut config.channel_b);
        if let Some(window) = self.phs_start {
            config.start_window = window;
        }
        if let Some(window) = self.phs_stop {
            config.stop_window = window;
        }
        if self.linear {
            config.interpolation = Interpolation::Linear;
        } else if let Some(render_points) = self.render_points {
            config.interpolation = Interpolation::CubicSpline { render_points };
        }
        if let Some(bin_width_ps) = self.bin_width_ps {
            config.bin_width_ps = bin_width_ps;
        }
        if let Some(number_of_bins) = self.number_of_bins {
            config.number_of_bins = number_of_bins;
        }
        if let Some(offset_ps) = self.offset_ps {
            config.offset_ps = offset_ps;
        }
        if let Some(checkpoint_interval) = self.checkpoint_interval {
            config.checkpoint_interval = checkpoint_interval;
        }
        Ok(config)
    }
}

#[derive(Default, Debug, Clone, Parser)]
pub struct MergeParameters {
    /// Spectrum files to sum.
    #[clap(required = true)]
    pub inputs: Vec<PathBuf>,

    #[clap(long)]
    pub output: PathBuf,

    /// Bin width shared by all inputs, in ps.
    #[clap(long, default_value = "5")]
    pub bin_width_ps: Real,
}

#[derive(Default, Debug, Clone, Parser)]
pub struct InspectParameters {
    /// Pulse-pair stream to describe.
    pub input: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    #[clap(about = "Accumulates the lifetime spectrum of a pulse-pair stream.")]
    Run(RunParameters),
    #[clap(about = "Sums spectra of identical geometry, bin by bin.")]
    Merge(MergeParameters),
    #[clap(about = "Prints a stream's header and the number of complete pulse pairs it holds.")]
    Inspect(InspectParameters),
}
