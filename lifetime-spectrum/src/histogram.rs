//! The lifetime spectrum and its persistence.
use pulse_lifetime_common::Real;
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

/// Header comment of the spectrum text format.
const SPECTRUM_HEADER: &str = "counts [#]";

#[derive(Debug, Error)]
pub enum HistogramError {
    #[error(
        "Histogram geometry mismatch: {left_bins} bins of {left_width} ps vs {right_bins} bins of {right_width} ps"
    )]
    GeometryMismatch {
        left_bins: usize,
        left_width: Real,
        right_bins: usize,
        right_width: Real,
    },
    #[error("Invalid count on line {line}: {content:?}")]
    Parse { line: usize, content: String },
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

/// Histogram of start/stop time differences.
#[derive(Debug, Clone, PartialEq)]
pub struct LifetimeHistogram {
    bins: Vec<u64>,
    bin_width_ps: Real,
    counts: u64,
}

impl LifetimeHistogram {
    pub fn new(number_of_bins: usize, bin_width_ps: Real) -> Self {
        Self {
            bins: vec![0; number_of_bins],
            bin_width_ps,
            counts: 0,
        }
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    pub fn bin_width_ps(&self) -> Real {
        self.bin_width_ps
    }

    pub fn number_of_bins(&self) -> usize {
        self.bins.len()
    }

    /// Total number of recorded lifetimes.
    pub fn counts(&self) -> u64 {
        self.counts
    }

    /// Width of the whole spectrum, in ps.
    pub fn range_ps(&self) -> Real {
        self.number_of_bins() as Real * self.bin_width_ps
    }

    /// The bin a lifetime falls in, `floor(lifetime / range × bins) − 1`,
    /// or `None` if that lies outside the histogram.
    pub fn bin_index(&self, lifetime_ps: Real) -> Option<usize> {
        let number_of_bins = self.number_of_bins() as Real;
        let index = (lifetime_ps / self.range_ps() * number_of_bins).floor() - 1.0;
        (index >= 0.0 && index < number_of_bins).then_some(index as usize)
    }

    /// Counts a lifetime, returning its bin. Out of range lifetimes are dropped.
    pub fn record(&mut self, lifetime_ps: Real) -> Option<usize> {
        let index = self.bin_index(lifetime_ps)?;
        self.bins[index] += 1;
        self.counts += 1;
        Some(index)
    }

    /// Adds `other` bin-wise. Both histograms must have the same geometry.
    pub fn merge(&mut self, other: &LifetimeHistogram) -> Result<(), HistogramError> {
        if self.bins.len() != other.bins.len() || self.bin_width_ps != other.bin_width_ps {
            return Err(HistogramError::GeometryMismatch {
                left_bins: self.bins.len(),
                left_width: self.bin_width_ps,
                right_bins: other.bins.len(),
                right_width: other.bin_width_ps,
            });
        }
        for (bin, count) in self.bins.iter_mut().zip(&other.bins) {
            *bin += count;
        }
        self.counts += other.counts;
        Ok(())
    }

    /// One header comment line, then one count per line.
    pub fn to_text(&self) -> String {
        let mut text = format!("# {SPECTRUM_HEADER}\n");
        for count in &self.bins {
            text.push_str(&count.to_string());
            text.push('\n');
        }
        text
    }

    /// Parses the spectrum text format. Comment and blank lines are skipped.
    /// Counts written in floating point notation are accepted if they are whole numbers.
    pub fn from_text(text: &str, bin_width_ps: Real) -> Result<Self, HistogramError> {
        let bins = text
            .lines()
            .enumerate()
            .map(|(line, content)| (line + 1, content.trim()))
            .filter(|(_, content)| !content.is_empty() && !content.starts_with('#'))
            .map(|(line, content)| {
                parse_count(content).ok_or_else(|| HistogramError::Parse {
                    line,
                    content: content.to_owned(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let counts = bins.iter().sum();
        Ok(Self {
            bins,
            bin_width_ps,
            counts,
        })
    }

    pub fn load(path: &Path, bin_width_ps: Real) -> Result<Self, HistogramError> {
        Self::from_text(&fs::read_to_string(path)?, bin_width_ps)
    }
}

fn parse_count(content: &str) -> Option<u64> {
    content.parse::<u64>().ok().or_else(|| {
        let value = content.parse::<Real>().ok()?;
        (value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as Real).then_some(value as u64)
    })
}

/// Destination for histogram snapshots. Each call replaces the previous snapshot.
pub trait SpectrumSink {
    fn persist(&mut self, histogram: &LifetimeHistogram) -> Result<(), HistogramError>;
}

impl<S: SpectrumSink + ?Sized> SpectrumSink for &mut S {
    fn persist(&mut self, histogram: &LifetimeHistogram) -> Result<(), HistogramError> {
        (**self).persist(histogram)
    }
}

/// Keeps every snapshot in memory.
impl SpectrumSink for Vec<LifetimeHistogram> {
    fn persist(&mut self, histogram: &LifetimeHistogram) -> Result<(), HistogramError> {
        self.push(histogram.clone());
        Ok(())
    }
}

/// Writes snapshots to a text file. Each snapshot is written to a sibling file first and
/// renamed over the target, so readers never see a partial spectrum.
#[derive(Debug, Clone)]
pub struct SpectrumFile {
    path: PathBuf,
    partial_path: PathBuf,
}

impl SpectrumFile {
    pub fn new(path: PathBuf) -> Self {
        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        Self {
            path,
            partial_path: PathBuf::from(partial),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SpectrumSink for SpectrumFile {
    #[tracing::instrument(skip_all, level = "debug", fields(path = %self.path.display()))]
    fn persist(&mut self, histogram: &LifetimeHistogram) -> Result<(), HistogramError> {
        let mut file = fs::File::create(&self.partial_path)?;
        file.write_all(histogram.to_text().as_bytes())?;
        file.sync_all()?;
        fs::rename(&self.partial_path, &self.path)?;
        debug!(counts = histogram.counts(), "Spectrum written");
        Ok(())
    }
}
