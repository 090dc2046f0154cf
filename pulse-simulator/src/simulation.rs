use crate::distribution::{DistributionError, FloatRandomDistribution};
use pulse_lifetime_common::{Detector, Polarity, Real, Sample};
use pulse_stream::{PulsePair, PulseRecord, PulseStreamWriter, StreamError, StreamHeader};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Write, path::Path};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid simulation file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Distribution Error: {0}")]
    Distribution(#[from] DistributionError),
    #[error("Invalid Normal Distribution: {0}")]
    Noise(#[from] rand_distr::NormalError),
    #[error("Stream Error: {0}")]
    Stream(#[from] StreamError),
    #[error("Number of cells must be positive")]
    NoCells,
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
}

/// Describes the synthetic coincidence events to generate.
/// Times are in ns and voltages in mV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PairSimulation {
    pub number_of_cells: usize,
    pub frequency_ghz: f64,
    pub polarity: Polarity,
    /// Detector which records the start pulse, the other records the stop pulse.
    pub start_detector: Detector,
    pub start_peak_ns: FloatRandomDistribution,
    pub start_amplitude_mv: FloatRandomDistribution,
    pub stop_amplitude_mv: FloatRandomDistribution,
    /// Delay between the start and stop pulses.
    pub lifetime_ns: FloatRandomDistribution,
    /// Standard deviation of the gaussian leading edge.
    pub rise_ns: f64,
    /// Time constant of the exponential trailing edge.
    pub decay_ns: f64,
    pub baseline_mv: f64,
    pub noise_mv: f64,
}

impl Default for PairSimulation {
    fn default() -> Self {
        Self {
            number_of_cells: 1024,
            frequency_ghz: 5.12,
            polarity: Polarity::Negative,
            start_detector: Detector::B,
            start_peak_ns: FloatRandomDistribution::Uniform {
                min: 45.0,
                max: 55.0,
            },
            start_amplitude_mv: FloatRandomDistribution::Uniform {
                min: 300.0,
                max: 400.0,
            },
            stop_amplitude_mv: FloatRandomDistribution::Uniform {
                min: 80.0,
                max: 120.0,
            },
            lifetime_ns: FloatRandomDistribution::Exponential { lifetime: 0.3 },
            rise_ns: 1.0,
            decay_ns: 3.0,
            baseline_mv: 0.0,
            noise_mv: 1.0,
        }
    }
}

impl PairSimulation {
    pub fn load(path: &Path) -> Result<Self, SimulationError> {
        Ok(serde_json::from_reader(File::open(path)?)?)
    }

    pub fn header(&self) -> StreamHeader {
        StreamHeader::new(
            self.number_of_cells,
            self.number_of_cells as f64 / self.frequency_ghz,
            self.frequency_ghz,
        )
    }

    fn validate(&self) -> Result<(), SimulationError> {
        if self.number_of_cells == 0 {
            return Err(SimulationError::NoCells);
        }
        for (name, value) in [
            ("frequency-ghz", self.frequency_ghz),
            ("rise-ns", self.rise_ns),
            ("decay-ns", self.decay_ns),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(SimulationError::NotPositive { name, value });
            }
        }
        Ok(())
    }

    /// Noise free detector response with extremum `amplitude` at `peak_ns`.
    fn shape(&self, time: Real, peak_ns: Real, amplitude: Real) -> Real {
        let dt = time - peak_ns;
        let envelope = if dt < 0.0 {
            (-dt * dt / (2.0 * self.rise_ns * self.rise_ns)).exp()
        } else {
            (-dt / self.decay_ns).exp()
        };
        match self.polarity {
            Polarity::Positive => amplitude * envelope,
            Polarity::Negative => -amplitude * envelope,
        }
    }
}

/// A generated pair together with the delay it was generated with.
#[derive(Debug, Clone)]
pub struct SimulatedPair {
    pub pair: PulsePair,
    pub lifetime_ns: Real,
}

/// Deterministic source of simulated pulse pairs for a given seed.
pub struct PairGenerator {
    simulation: PairSimulation,
    time: Vec<Sample>,
    noise: Normal<Real>,
    rng: StdRng,
}

impl PairGenerator {
    pub fn new(simulation: PairSimulation, seed: u64) -> Result<Self, SimulationError> {
        simulation.validate()?;
        let time = (0..simulation.number_of_cells)
            .map(|cell| (cell as f64 / simulation.frequency_ghz) as Sample)
            .collect();
        let noise = Normal::new(simulation.baseline_mv, simulation.noise_mv)?;
        Ok(Self {
            simulation,
            time,
            noise,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn record(&mut self, peak_ns: Real, amplitude: Real) -> PulseRecord {
        let voltage = self
            .time
            .iter()
            .map(|&time| {
                let signal = self.simulation.shape(Real::from(time), peak_ns, amplitude);
                (signal + self.noise.sample(&mut self.rng)) as Sample
            })
            .collect();
        PulseRecord::new(self.time.clone(), voltage)
    }

    #[tracing::instrument(skip_all, level = "trace")]
    pub fn next_pair(&mut self) -> Result<SimulatedPair, SimulationError> {
        let start_peak = self.simulation.start_peak_ns.sample(&mut self.rng)?;
        let lifetime_ns = self.simulation.lifetime_ns.sample(&mut self.rng)?;
        let start_amplitude = self.simulation.start_amplitude_mv.sample(&mut self.rng)?;
        let stop_amplitude = self.simulation.stop_amplitude_mv.sample(&mut self.rng)?;

        let start = self.record(start_peak, start_amplitude);
        let stop = self.record(start_peak + lifetime_ns, stop_amplitude);
        let pair = match self.simulation.start_detector {
            Detector::A => PulsePair { a: start, b: stop },
            Detector::B => PulsePair { a: stop, b: start },
        };
        Ok(SimulatedPair { pair, lifetime_ns })
    }

    pub fn generate(&mut self, pairs: usize) -> Result<Vec<SimulatedPair>, SimulationError> {
        (0..pairs).map(|_| self.next_pair()).collect()
    }
}

/// Writes `pairs` simulated pairs to `writer`, returning the mean simulated lifetime (ns).
pub fn write_stream<W: Write>(
    generator: &mut PairGenerator,
    writer: &mut PulseStreamWriter<W>,
    pairs: usize,
) -> Result<Real, SimulationError> {
    let mut total_lifetime = 0.0;
    for index in 0..pairs {
        let SimulatedPair { pair, lifetime_ns } = generator.next_pair()?;
        writer.write_pulse_pair(&pair.a, &pair.b)?;
        total_lifetime += lifetime_ns;
        if (index + 1) % 1000 == 0 {
            debug!("Simulated {} of {pairs} pairs", index + 1);
        }
    }
    let mean_lifetime = match pairs {
        0 => 0.0,
        _ => total_lifetime / pairs as Real,
    };
    info!(
        "Simulated {pairs} pairs, {} bytes, mean lifetime {:.1} ps",
        writer.bytes_written(),
        1000.0 * mean_lifetime
    );
    Ok(mean_lifetime)
}
