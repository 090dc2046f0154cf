pub mod metrics;
mod tracer;

use serde::{Deserialize, Serialize};

pub use tracer::init_tracing;

/// Working precision of all signal processing.
pub type Real = f64;

/// On-disk precision of time and voltage samples.
pub type Sample = f32;

/// Whether the signal of interest is a positive- or negative-going excursion from baseline.
/// This is a system-wide setting, it decides whether the extremum of a pulse is its maximum
/// or its minimum.
#[derive(
    Default,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Polarity {
    Positive,
    #[default]
    Negative,
}

impl Polarity {
    /// Returns true if `value` lies further along the pulse direction than `reference`.
    pub fn exceeds(self, value: Real, reference: Real) -> bool {
        match self {
            Polarity::Positive => value > reference,
            Polarity::Negative => value < reference,
        }
    }

    /// Index of the first maximum (positive) or minimum (negative) of `values`.
    pub fn extremum_index(self, values: &[Real]) -> Option<usize> {
        values
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<(usize, Real)>, (index, value)| match best {
                Some((_, extremum)) if !self.exceeds(value, extremum) => best,
                _ => Some((index, value)),
            })
            .map(|(index, _)| index)
    }
}

/// The two physical detectors of a coincidence stream, in the order their records are interleaved.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Detector {
    A,
    B,
}
