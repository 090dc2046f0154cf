//! Pulse-height gating, timing and binning of coincident pulse pairs.
use crate::{
    cfd::{CfdRejection, TimedPulse, lifetime},
    histogram::{HistogramError, LifetimeHistogram, SpectrumSink},
    parameters::RunConfig,
};
use metrics::counter;
use pulse_lifetime_common::{
    Real,
    metrics::{exclusions::ExclusionKind, names::CHECKPOINTS_WRITTEN},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Which physical detector provides the start signal and which the stop signal.
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
pub enum StartStop {
    #[default]
    BStartAStop,
    AStartBStop,
}

/// Inclusive acceptance window on the absolute pulse amplitude, in mV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PulseHeightWindow {
    pub lower: Real,
    pub upper: Real,
}

impl PulseHeightWindow {
    pub fn new(lower: Real, upper: Real) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, amplitude: Real) -> bool {
        let amplitude = amplitude.abs();
        amplitude >= self.lower && amplitude <= self.upper
    }
}

/// One channel of a coincident pair, conditioned for timing.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct ChannelPulse {
    pub time: Vec<Real>,
    /// Conditioned copy of the voltage trace used for timing.
    pub voltage: Vec<Real>,
    /// Signed extremum of `voltage`.
    pub amplitude: Real,
    /// Decision of the channel's classifier on the normalized shape.
    pub accepted: bool,
}

impl ChannelPulse {
    fn timed(&self, cfd_level: Real) -> TimedPulse<'_> {
        TimedPulse {
            time: &self.time,
            voltage: &self.voltage,
            amplitude: self.amplitude,
            cfd_level,
        }
    }
}

/// What became of a pulse pair handed to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairOutcome {
    InvalidNormalization,
    ClassifierRejected,
    PulseHeightRejected,
    TimingRejected(CfdRejection),
    OutOfRange { lifetime: Real },
    Counted {
        lifetime: Real,
        bin: usize,
        /// Whether this count triggered a snapshot of the spectrum.
        checkpoint: bool,
    },
}

impl PairOutcome {
    pub fn exclusion(&self) -> Option<ExclusionKind> {
        match self {
            PairOutcome::InvalidNormalization => Some(ExclusionKind::InvalidNormalization),
            PairOutcome::ClassifierRejected => Some(ExclusionKind::ClassifierRejected),
            PairOutcome::PulseHeightRejected => Some(ExclusionKind::PulseHeightRejected),
            PairOutcome::TimingRejected(_) => Some(ExclusionKind::TimingRejected),
            PairOutcome::OutOfRange { .. } => Some(ExclusionKind::OutOfRange),
            PairOutcome::Counted { .. } => None,
        }
    }
}

/// Owns the lifetime histogram of a run and snapshots it to a sink.
pub struct LifetimeAccumulator<S: SpectrumSink> {
    config: RunConfig,
    histogram: LifetimeHistogram,
    sink: S,
    checkpoints: u64,
}

impl<S: SpectrumSink> LifetimeAccumulator<S> {
    pub fn new(config: RunConfig, sink: S) -> Self {
        let histogram = LifetimeHistogram::new(config.number_of_bins, config.bin_width_ps);
        Self {
            config,
            histogram,
            sink,
            checkpoints: 0,
        }
    }

    pub fn histogram(&self) -> &LifetimeHistogram {
        &self.histogram
    }

    /// Number of snapshots persisted so far.
    pub fn checkpoints(&self) -> u64 {
        self.checkpoints
    }

    fn persist(&mut self) -> Result<(), HistogramError> {
        self.sink.persist(&self.histogram)?;
        self.checkpoints += 1;
        counter!(CHECKPOINTS_WRITTEN).increment(1);
        Ok(())
    }

    /// Gates, times and bins one coincident pair.
    ///
    /// Both pulses must have been accepted by their classifiers, and the start and stop
    /// amplitudes must lie in their windows. Every `checkpoint-interval` counts the
    /// spectrum is persisted.
    #[tracing::instrument(skip_all, level = "trace")]
    pub fn accept(
        &mut self,
        a: &ChannelPulse,
        b: &ChannelPulse,
    ) -> Result<PairOutcome, HistogramError> {
        if !(a.accepted && b.accepted) {
            return Ok(PairOutcome::ClassifierRejected);
        }

        let (start, start_level, stop, stop_level) = match self.config.start_stop {
            StartStop::BStartAStop => (
                b,
                self.config.channel_b.cfd_level,
                a,
                self.config.channel_a.cfd_level,
            ),
            StartStop::AStartBStop => (
                a,
                self.config.channel_a.cfd_level,
                b,
                self.config.channel_b.cfd_level,
            ),
        };
        if !(self.config.start_window.contains(start.amplitude)
            && self.config.stop_window.contains(stop.amplitude))
        {
            trace!(
                start = start.amplitude,
                stop = stop.amplitude,
                "Pulse heights outside windows"
            );
            return Ok(PairOutcome::PulseHeightRejected);
        }

        let lifetime = match lifetime(
            &start.timed(start_level),
            &stop.timed(stop_level),
            &self.config.timing(),
        ) {
            Ok(lifetime) => lifetime + self.config.offset_ps,
            Err(rejection) => {
                trace!(%rejection, "Timing rejected");
                return Ok(PairOutcome::TimingRejected(rejection));
            }
        };

        let Some(bin) = self.histogram.record(lifetime) else {
            return Ok(PairOutcome::OutOfRange { lifetime });
        };
        let interval = self.config.checkpoint_interval;
        let checkpoint = interval > 0 && self.histogram.counts() % interval == 0;
        if checkpoint {
            self.persist()?;
            debug!(counts = self.histogram.counts(), "Spectrum checkpoint");
        }
        Ok(PairOutcome::Counted {
            lifetime,
            bin,
            checkpoint,
        })
    }

    /// Persists the final spectrum, regardless of the checkpoint interval.
    pub fn finish(mut self) -> Result<LifetimeHistogram, HistogramError> {
        self.persist()?;
        Ok(self.histogram)
    }
}
