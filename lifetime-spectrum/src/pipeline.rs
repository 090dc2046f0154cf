//! Drives a pulse-pair stream through conditioning, classification, timing and binning.
use crate::{
    accumulator::{ChannelPulse, LifetimeAccumulator, PairOutcome},
    classifier::PulseClassifier,
    conditioning::{ConditioningError, condition},
    histogram::{HistogramError, LifetimeHistogram, SpectrumSink},
    normalize::{NormalizedPulse, normalize},
    parameters::{ConfigError, RunConfig},
};
use metrics::counter;
use pulse_lifetime_common::{
    Detector, Real,
    metrics::{
        exclusions::{self, ExclusionKind},
        failures::{self, FailureKind},
        names::{FAILURES, PULSE_PAIRS_EXCLUDED, PULSE_PAIRS_READ, SPECTRUM_COUNTS},
    },
};
use pulse_stream::{PulsePair, PulseRecord, PulseStreamReader, StreamError};
use std::io::Read;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Stream Error: {0}")]
    Stream(#[from] StreamError),
    #[error("Spectrum Error: {0}")]
    Histogram(#[from] HistogramError),
    #[error("Conditioning Error: {0}")]
    Conditioning(#[from] ConditioningError),
}

/// Tally of what became of every pair in a stream.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pairs_read: u64,
    pub invalid_normalization: u64,
    pub classifier_rejected: u64,
    pub pulse_height_rejected: u64,
    pub timing_rejected: u64,
    pub out_of_range: u64,
    /// Lifetimes in the final spectrum.
    pub counts: u64,
    /// Snapshots persisted, including the final one.
    pub checkpoints: u64,
}

impl RunSummary {
    fn exclude(&mut self, kind: ExclusionKind) {
        let tally = match kind {
            ExclusionKind::InvalidNormalization => &mut self.invalid_normalization,
            ExclusionKind::ClassifierRejected => &mut self.classifier_rejected,
            ExclusionKind::PulseHeightRejected => &mut self.pulse_height_rejected,
            ExclusionKind::TimingRejected => &mut self.timing_rejected,
            ExclusionKind::OutOfRange => &mut self.out_of_range,
        };
        *tally += 1;
    }

    pub fn excluded(&self) -> u64 {
        self.invalid_normalization
            + self.classifier_rejected
            + self.pulse_height_rejected
            + self.timing_rejected
            + self.out_of_range
    }
}

fn record_failure(error: &PipelineError) {
    let kind = match error {
        PipelineError::Stream(_) => FailureKind::UnableToDecodeStream,
        PipelineError::Histogram(_) => FailureKind::FileWriteFailed,
        PipelineError::Config(_) | PipelineError::Conditioning(_) => return,
    };
    counter!(FAILURES, &[failures::get_label(kind)]).increment(1);
}

/// Single-threaded pull of pulse pairs from one stream into one spectrum.
pub struct Pipeline<S: SpectrumSink> {
    config: RunConfig,
    classifier_a: Box<dyn PulseClassifier>,
    classifier_b: Box<dyn PulseClassifier>,
    accumulator: LifetimeAccumulator<S>,
    stream_len: Option<usize>,
}

impl<S: SpectrumSink> Pipeline<S> {
    pub fn new(
        config: RunConfig,
        classifier_a: Box<dyn PulseClassifier>,
        classifier_b: Box<dyn PulseClassifier>,
        sink: S,
    ) -> Self {
        let accumulator = LifetimeAccumulator::new(config.clone(), sink);
        Self {
            config,
            classifier_a,
            classifier_b,
            accumulator,
            stream_len: None,
        }
    }

    /// Total length of the stream in bytes, used to estimate progress.
    pub fn with_stream_len(self, stream_len: usize) -> Self {
        Self {
            stream_len: Some(stream_len),
            ..self
        }
    }

    /// Conditions one record into its normalized classifier shape and its timing pulse.
    fn prepare(
        &self,
        record: &PulseRecord,
        detector: Detector,
        number_of_cells: usize,
    ) -> Result<(NormalizedPulse, ChannelPulse), ConditioningError> {
        let settings = self.config.channel(detector);
        let voltage = record.voltage_as_real();

        let shape = condition(&voltage, &settings.conditioning)?;
        let timing = condition(&voltage, &settings.timing_conditioning())?;
        let amplitude = self
            .config
            .polarity
            .extremum_index(&timing)
            .map(|index| timing[index])
            .unwrap_or_default();

        Ok((
            normalize(&shape, number_of_cells, self.config.polarity),
            ChannelPulse {
                time: record.time_as_real(),
                voltage: timing,
                amplitude,
                accepted: false,
            },
        ))
    }

    #[tracing::instrument(skip_all, level = "trace")]
    fn process_pair(
        &mut self,
        pair: &PulsePair,
        number_of_cells: usize,
    ) -> Result<PairOutcome, PipelineError> {
        let (shape_a, mut pulse_a) = self.prepare(&pair.a, Detector::A, number_of_cells)?;
        let (shape_b, mut pulse_b) = self.prepare(&pair.b, Detector::B, number_of_cells)?;
        if !(shape_a.valid && shape_b.valid) {
            return Ok(PairOutcome::InvalidNormalization);
        }
        pulse_a.accepted = self.classifier_a.classify(&shape_a.samples);
        pulse_b.accepted = self.classifier_b.classify(&shape_b.samples);
        Ok(self.accumulator.accept(&pulse_a, &pulse_b)?)
    }

    fn report_progress(&self, bytes_read: usize) {
        let counts = self.accumulator.histogram().counts();
        match self.stream_len {
            Some(stream_len) if stream_len > 0 && bytes_read > 0 => {
                let fraction = bytes_read as Real / stream_len as Real;
                debug!(
                    bytes_read,
                    stream_len,
                    percent = 100.0 * fraction,
                    counts,
                    estimated_counts = (counts as Real / fraction).round() as u64,
                    "Progress"
                );
            }
            _ => debug!(bytes_read, counts, "Progress"),
        }
    }

    /// Processes pairs until the stream is exhausted, then persists the final spectrum.
    ///
    /// The configuration is validated against the stream header before any pair is read.
    pub fn run<R: Read>(
        self,
        reader: &mut PulseStreamReader<R>,
    ) -> Result<(RunSummary, LifetimeHistogram), PipelineError> {
        self.run_to_end(reader).inspect_err(record_failure)
    }

    fn run_to_end<R: Read>(
        mut self,
        reader: &mut PulseStreamReader<R>,
    ) -> Result<(RunSummary, LifetimeHistogram), PipelineError> {
        let header = *reader.header();
        self.config.validate(header.number_of_cells)?;
        info!(
            number_of_cells = header.number_of_cells,
            sweep_ns = header.sweep_ns,
            frequency_ghz = header.frequency_ghz,
            "Processing stream"
        );

        let mut summary = RunSummary::default();
        while let Some(pair) = reader.next_pair()? {
            summary.pairs_read += 1;
            counter!(PULSE_PAIRS_READ).increment(1);

            let outcome = self.process_pair(&pair, header.number_of_cells)?;
            match outcome.exclusion() {
                Some(kind) => {
                    summary.exclude(kind);
                    counter!(PULSE_PAIRS_EXCLUDED, &[exclusions::get_label(kind)]).increment(1);
                }
                None => counter!(SPECTRUM_COUNTS).increment(1),
            }
            if let PairOutcome::Counted {
                checkpoint: true, ..
            } = outcome
            {
                self.report_progress(reader.bytes_read());
            }
        }

        summary.checkpoints = self.accumulator.checkpoints() + 1;
        let histogram = self.accumulator.finish()?;
        summary.counts = histogram.counts();
        if summary.counts == 0 {
            warn!(pairs_read = summary.pairs_read, "Spectrum is empty");
        }
        info!(
            pairs_read = summary.pairs_read,
            excluded = summary.excluded(),
            counts = summary.counts,
            "Stream exhausted"
        );
        Ok((summary, histogram))
    }
}
