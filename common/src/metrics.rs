use metrics::{describe_counter, describe_gauge, gauge};

pub fn component_info_metric(name: &'static str) {
    static NAME: &str = "pulse_lifetime_component_info";

    describe_gauge!(NAME, "Basic information about the component");

    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("unknown");
    gauge!(NAME, "component" => name, "version" => version).set(1);
}

pub fn describe_metrics() {
    describe_counter!(
        names::PULSE_PAIRS_READ,
        metrics::Unit::Count,
        "Number of complete pulse pairs decoded from the stream"
    );
    describe_counter!(
        names::PULSE_PAIRS_EXCLUDED,
        metrics::Unit::Count,
        "Number of pulse pairs excluded from the spectrum, by reason"
    );
    describe_counter!(
        names::SPECTRUM_COUNTS,
        metrics::Unit::Count,
        "Number of lifetimes accumulated into the spectrum"
    );
    describe_counter!(
        names::CHECKPOINTS_WRITTEN,
        metrics::Unit::Count,
        "Number of spectrum snapshots persisted"
    );
    describe_counter!(
        names::FAILURES,
        metrics::Unit::Count,
        "Number of failures encountered"
    );
}

pub mod names {
    use const_format::concatcp;

    pub const METRIC_NAME_PREFIX: &str = "pulse_lifetime_";

    pub const FAILURES: &str = concatcp!(METRIC_NAME_PREFIX, "failures");
    pub const PULSE_PAIRS_READ: &str = concatcp!(METRIC_NAME_PREFIX, "pulse_pairs_read");
    pub const PULSE_PAIRS_EXCLUDED: &str = concatcp!(METRIC_NAME_PREFIX, "pulse_pairs_excluded");
    pub const SPECTRUM_COUNTS: &str = concatcp!(METRIC_NAME_PREFIX, "spectrum_counts");
    pub const CHECKPOINTS_WRITTEN: &str = concatcp!(METRIC_NAME_PREFIX, "checkpoints_written");
}

pub mod exclusions {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
    pub enum ExclusionKind {
        InvalidNormalization,
        ClassifierRejected,
        PulseHeightRejected,
        TimingRejected,
        OutOfRange,
    }

    // Label building function
    pub fn get_label(kind: ExclusionKind) -> (&'static str, &'static str) {
        (
            "exclusion_kind",
            match kind {
                ExclusionKind::InvalidNormalization => "invalid_normalization",
                ExclusionKind::ClassifierRejected => "classifier_rejected",
                ExclusionKind::PulseHeightRejected => "pulse_height_rejected",
                ExclusionKind::TimingRejected => "timing_rejected",
                ExclusionKind::OutOfRange => "out_of_range",
            },
        )
    }
}

pub mod failures {
    #[derive(Debug, Clone, Eq, Hash, PartialEq)]
    pub enum FailureKind {
        FileWriteFailed,
        UnableToDecodeStream,
    }

    // Label building function
    pub fn get_label(failure_kind: FailureKind) -> (&'static str, &'static str) {
        (
            "failure_kind",
            match failure_kind {
                FailureKind::FileWriteFailed => "file_write_failed",
                FailureKind::UnableToDecodeStream => "unable_to_decode_stream",
            },
        )
    }
}
