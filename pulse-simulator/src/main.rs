use anyhow::Result;
use clap::Parser;
use pulse_lifetime_common::{Detector, Polarity, init_tracing};
use pulse_simulator::{FloatRandomDistribution, PairGenerator, PairSimulation, write_stream};
use pulse_stream::PulseStreamWriter;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Path of the pulse stream to write
    #[clap(long)]
    output: PathBuf,

    /// Number of pulse pairs to simulate
    #[clap(long, default_value = "1000")]
    pairs: usize,

    /// JSON file describing the simulated pulses, defaults are used if omitted
    #[clap(long)]
    config: Option<PathBuf>,

    /// Mean of an exponentially distributed lifetime (ps), overrides the config file
    #[clap(long)]
    lifetime_ps: Option<f64>,

    /// Standard deviation of the voltage noise (mV), overrides the config file
    #[clap(long)]
    noise_mv: Option<f64>,

    /// Pulse polarity, overrides the config file
    #[clap(long)]
    polarity: Option<Polarity>,

    /// Detector recording the start pulse, overrides the config file
    #[clap(long)]
    start_detector: Option<Detector>,

    /// Random seed, a fresh one is drawn if omitted
    #[clap(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Cli::parse();

    let mut simulation = match &args.config {
        Some(path) => PairSimulation::load(path)?,
        None => PairSimulation::default(),
    };
    if let Some(lifetime_ps) = args.lifetime_ps {
        simulation.lifetime_ns = FloatRandomDistribution::Exponential {
            lifetime: lifetime_ps / 1000.0,
        };
    }
    if let Some(noise_mv) = args.noise_mv {
        simulation.noise_mv = noise_mv;
    }
    if let Some(polarity) = args.polarity {
        simulation.polarity = polarity;
    }
    if let Some(start_detector) = args.start_detector {
        simulation.start_detector = start_detector;
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    info!(
        "Simulating {} pairs to {}, seed {seed}, expected lifetime {:.1} ps",
        args.pairs,
        args.output.display(),
        1000.0 * simulation.lifetime_ns.mean()
    );

    let header = simulation.header();
    let mut generator = PairGenerator::new(simulation, seed)?;
    let mut writer = PulseStreamWriter::create(&args.output, header)?;
    write_stream(&mut generator, &mut writer, args.pairs)?;
    writer.finish()?;
    Ok(())
}
