use anyhow::{Result, anyhow};
use clap::Parser;
use lifetime_spectrum::{
    AcceptAll, LifetimeHistogram, Pipeline, PulseClassifier, ReferenceShapeClassifier,
    SpectrumFile, SpectrumSink,
    parameters::{InspectParameters, MergeParameters, Mode, RunParameters},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use pulse_lifetime_common::{
    init_tracing,
    metrics::{component_info_metric, describe_metrics},
};
use pulse_stream::PulseStreamReader;
use std::{fs, net::SocketAddr, path::Path};
use tracing::{debug, info};

// cargo run --bin lifetime-spectrum -- run --input pairs.bin --output spectrum.txt --phs-start 250,450 --phs-stop 50,150

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// If set, Prometheus metrics are served on this address.
    #[clap(long)]
    observability_address: Option<SocketAddr>,

    #[command(subcommand)]
    mode: Mode,
}

fn main() -> Result<()> {
    init_tracing();

    let args = Cli::parse();
    debug!("{args:?}");

    if let Some(address) = args.observability_address {
        PrometheusBuilder::new()
            .with_http_listener(address)
            .install()?;
        describe_metrics();
        component_info_metric("lifetime-spectrum");
    }

    match args.mode {
        Mode::Run(parameters) => run(&parameters),
        Mode::Merge(parameters) => merge(&parameters),
        Mode::Inspect(parameters) => inspect(&parameters),
    }
}

fn classifier(reference_shape: Option<&Path>) -> Result<Box<dyn PulseClassifier>> {
    Ok(match reference_shape {
        Some(path) => {
            info!(path = %path.display(), "Loading reference shape classifier");
            Box::new(ReferenceShapeClassifier::load(path)?)
        }
        None => Box::new(AcceptAll),
    })
}

fn run(parameters: &RunParameters) -> Result<()> {
    let config = parameters.run_config()?;
    debug!("{config:?}");

    let stream_len = fs::metadata(&parameters.input)?.len();
    let mut reader = PulseStreamReader::open(&parameters.input)?;

    let pipeline = Pipeline::new(
        config,
        classifier(parameters.reference_shape_a.as_deref())?,
        classifier(parameters.reference_shape_b.as_deref())?,
        SpectrumFile::new(parameters.output.clone()),
    )
    .with_stream_len(usize::try_from(stream_len)?);
    let (summary, _) = pipeline.run(&mut reader)?;

    info!(
        pairs_read = summary.pairs_read,
        invalid_normalization = summary.invalid_normalization,
        classifier_rejected = summary.classifier_rejected,
        pulse_height_rejected = summary.pulse_height_rejected,
        timing_rejected = summary.timing_rejected,
        out_of_range = summary.out_of_range,
        counts = summary.counts,
        "Spectrum written to {}",
        parameters.output.display()
    );
    Ok(())
}

fn merge(parameters: &MergeParameters) -> Result<()> {
    let mut merged: Option<LifetimeHistogram> = None;
    for path in &parameters.inputs {
        let spectrum = LifetimeHistogram::load(path, parameters.bin_width_ps)?;
        info!(path = %path.display(), counts = spectrum.counts(), "Loaded spectrum");
        match merged.as_mut() {
            Some(merged) => merged.merge(&spectrum)?,
            None => merged = Some(spectrum),
        }
    }
    let merged = merged.ok_or_else(|| anyhow!("No spectra to merge"))?;

    SpectrumFile::new(parameters.output.clone()).persist(&merged)?;
    info!(
        counts = merged.counts(),
        bins = merged.number_of_bins(),
        "Merged spectrum written to {}",
        parameters.output.display()
    );
    Ok(())
}

fn inspect(parameters: &InspectParameters) -> Result<()> {
    let stream_len = usize::try_from(fs::metadata(&parameters.input)?.len())?;
    let reader = PulseStreamReader::open(&parameters.input)?;
    let header = reader.header();

    println!("number of cells:  {}", header.number_of_cells);
    println!("sweep in ns:      {}", header.sweep_ns);
    println!("frequency in GHz: {}", header.frequency_ghz);
    println!("pulse pairs:      {}", header.complete_pairs(stream_len));
    Ok(())
}
