//! Lifetime spectra of coincident detector pulse pairs.
//!
//! Each pair of an interleaved A/B stream is conditioned, its normalized shapes are classified,
//! and the constant-fraction crossing times of the accepted, pulse-height gated pairs are
//! differenced and binned into a [LifetimeHistogram].
pub mod accumulator;
pub mod cfd;
pub mod classifier;
pub mod conditioning;
pub mod histogram;
pub mod normalize;
pub mod parameters;
pub mod pipeline;

pub use accumulator::{ChannelPulse, LifetimeAccumulator, PairOutcome, PulseHeightWindow, StartStop};
pub use cfd::{CfdRejection, CubicSpline, Interpolation, SplineError, crossing_time, lifetime};
pub use classifier::{
    AcceptAll, LabelClassifier, Prediction, PulseClassifier, ReferenceShapeClassifier,
};
pub use histogram::{HistogramError, LifetimeHistogram, SpectrumFile, SpectrumSink};
pub use normalize::{NormalizedPulse, normalize};
pub use parameters::{ChannelSettings, ConfigError, RunConfig};
pub use pipeline::{Pipeline, PipelineError, RunSummary};
