use assert_approx_eq::assert_approx_eq;
use lifetime_spectrum::{
    AcceptAll, Interpolation, LifetimeHistogram, Pipeline, RunConfig, RunSummary, SpectrumFile,
    SpectrumSink, StartStop,
};
use pulse_lifetime_common::{Detector, Polarity};
use pulse_simulator::{PairGenerator, PairSimulation, SimulatedPair, write_stream};
use pulse_stream::{PulseStreamReader, PulseStreamWriter};
use std::io::Cursor;

const OFFSET_PS: f64 = 1000.0;

fn config() -> RunConfig {
    RunConfig {
        offset_ps: OFFSET_PS,
        ..Default::default()
    }
}

/// Linear interpolation rejects no clean pulse, so every pair is counted.
fn linear_config() -> RunConfig {
    RunConfig {
        interpolation: Interpolation::Linear,
        ..config()
    }
}

/// Crossings the spline rescan resolves too near either end of its rendered interval are
/// rejected, so a few clean pairs go uncounted.
fn assert_only_timing_losses(summary: &RunSummary) {
    assert_eq!(summary.excluded(), summary.timing_rejected);
    assert_eq!(summary.counts, summary.pairs_read - summary.timing_rejected);
    assert!(10 * summary.timing_rejected <= summary.pairs_read);
}

/// Sums of the snapshots taken every hundred counts, then at the end.
fn expected_snapshot_sums(counts: u64) -> Vec<u64> {
    (1..=counts / 100)
        .map(|checkpoint| 100 * checkpoint)
        .chain([counts])
        .collect()
}

fn simulate(simulation: PairSimulation, seed: u64, pairs: usize) -> (Vec<u8>, f64) {
    let header = simulation.header();
    let mut generator = PairGenerator::new(simulation, seed).unwrap();
    let mut writer = PulseStreamWriter::new(Vec::new(), header).unwrap();
    let mean_lifetime_ns = write_stream(&mut generator, &mut writer, pairs).unwrap();
    (writer.finish().unwrap(), mean_lifetime_ns)
}

fn stream_of(simulation: &PairSimulation, pairs: &[SimulatedPair]) -> Vec<u8> {
    let mut writer = PulseStreamWriter::new(Vec::new(), simulation.header()).unwrap();
    for SimulatedPair { pair, .. } in pairs {
        writer.write_pulse_pair(&pair.a, &pair.b).unwrap();
    }
    writer.finish().unwrap()
}

fn process<S: SpectrumSink>(
    config: RunConfig,
    bytes: Vec<u8>,
    sink: S,
) -> (RunSummary, LifetimeHistogram) {
    let stream_len = bytes.len();
    let mut reader = PulseStreamReader::new(Cursor::new(bytes)).unwrap();
    Pipeline::new(config, Box::new(AcceptAll), Box::new(AcceptAll), sink)
        .with_stream_len(stream_len)
        .run(&mut reader)
        .unwrap()
}

/// Mean lifetime (ps) of a spectrum, taking each count at the centre of its bin.
fn mean_lifetime_ps(histogram: &LifetimeHistogram, offset_ps: f64) -> f64 {
    let width = histogram.bin_width_ps();
    let total: f64 = histogram
        .bins()
        .iter()
        .enumerate()
        .map(|(bin, &count)| (bin as f64 + 1.5) * width * count as f64)
        .sum();
    total / histogram.counts() as f64 - offset_ps
}

#[test]
fn recovers_simulated_lifetime() {
    let (bytes, mean_lifetime_ns) = simulate(PairSimulation::default(), 42, 400);
    let (summary, histogram) = process(linear_config(), bytes, Vec::new());

    assert_eq!(summary.pairs_read, 400);
    assert_eq!(summary.excluded(), 0);
    assert_eq!(summary.counts, 400);
    assert_eq!(histogram.bins().iter().sum::<u64>(), 400);
    assert_approx_eq!(
        mean_lifetime_ps(&histogram, OFFSET_PS),
        1000.0 * mean_lifetime_ns,
        10.0
    );
}

#[test]
fn spline_timing_recovers_simulated_lifetime() {
    let (bytes, mean_lifetime_ns) = simulate(PairSimulation::default(), 42, 400);
    let (summary, histogram) = process(config(), bytes, Vec::new());

    assert_eq!(summary.pairs_read, 400);
    assert_only_timing_losses(&summary);
    assert_eq!(histogram.bins().iter().sum::<u64>(), summary.counts);
    assert_approx_eq!(
        mean_lifetime_ps(&histogram, OFFSET_PS),
        1000.0 * mean_lifetime_ns,
        20.0
    );
}

#[test]
fn positive_pulses_starting_on_a() {
    let simulation = PairSimulation {
        polarity: Polarity::Positive,
        start_detector: Detector::A,
        ..Default::default()
    };
    let (bytes, mean_lifetime_ns) = simulate(simulation, 5, 200);
    let config = RunConfig {
        polarity: Polarity::Positive,
        start_stop: StartStop::AStartBStop,
        ..linear_config()
    };
    let (summary, histogram) = process(config, bytes, Vec::new());

    assert_eq!(summary.counts, 200);
    assert_approx_eq!(
        mean_lifetime_ps(&histogram, OFFSET_PS),
        1000.0 * mean_lifetime_ns,
        10.0
    );
}

#[test]
fn wrong_start_channel_fails_pulse_height_selection() {
    let (bytes, _) = simulate(PairSimulation::default(), 9, 50);
    let config = RunConfig {
        start_stop: StartStop::AStartBStop,
        ..config()
    };
    let (summary, histogram) = process(config, bytes, Vec::new());

    assert_eq!(summary.pulse_height_rejected, 50);
    assert_eq!(histogram.counts(), 0);
}

#[test]
fn merged_runs_match_concatenated_run() {
    let simulation = PairSimulation::default();
    let first = PairGenerator::new(simulation.clone(), 1)
        .unwrap()
        .generate(60)
        .unwrap();
    let second = PairGenerator::new(simulation.clone(), 2)
        .unwrap()
        .generate(40)
        .unwrap();
    let both: Vec<_> = first.iter().chain(&second).cloned().collect();

    let (_, mut merged) = process(config(), stream_of(&simulation, &first), Vec::new());
    let (_, second_histogram) = process(config(), stream_of(&simulation, &second), Vec::new());
    merged.merge(&second_histogram).unwrap();
    let (summary, concatenated) = process(config(), stream_of(&simulation, &both), Vec::new());

    assert_eq!(summary.pairs_read, 100);
    assert_eq!(merged.counts(), concatenated.counts());
    assert_eq!(merged.bins(), concatenated.bins());
}

#[test]
fn spectrum_file_holds_final_histogram() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spectrum.txt");
    let (bytes, _) = simulate(PairSimulation::default(), 11, 250);

    let (summary, histogram) = process(config(), bytes, SpectrumFile::new(path.clone()));
    assert_only_timing_losses(&summary);
    assert_eq!(summary.checkpoints, summary.counts / 100 + 1);

    let loaded = LifetimeHistogram::load(&path, histogram.bin_width_ps()).unwrap();
    assert_eq!(loaded.bins(), histogram.bins());
    assert_eq!(loaded.counts(), summary.counts);
    assert!(!dir.path().join("spectrum.txt.partial").exists());
}

#[test]
fn snapshots_every_hundred_counts() {
    let (bytes, _) = simulate(PairSimulation::default(), 13, 230);
    let mut snapshots = Vec::new();
    let (summary, histogram) = process(config(), bytes, &mut snapshots);

    assert_only_timing_losses(&summary);
    let sums: Vec<u64> = snapshots
        .iter()
        .map(|snapshot| snapshot.bins().iter().sum())
        .collect();
    assert_eq!(sums, expected_snapshot_sums(summary.counts));
    assert_eq!(snapshots.last().map(LifetimeHistogram::bins), Some(histogram.bins()));
}

#[test]
fn linear_snapshots_every_hundred_counts() {
    let (bytes, _) = simulate(PairSimulation::default(), 13, 230);
    let mut snapshots = Vec::new();
    let (summary, _) = process(linear_config(), bytes, &mut snapshots);

    assert_eq!(summary.counts, 230);
    let sums: Vec<u64> = snapshots
        .iter()
        .map(|snapshot| snapshot.bins().iter().sum())
        .collect();
    assert_eq!(sums, [100, 200, 230]);
}
