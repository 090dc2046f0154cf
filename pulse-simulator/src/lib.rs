//! Synthetic two-channel coincidence streams with a known lifetime distribution.

mod distribution;
mod simulation;

pub use distribution::{DistributionError, FloatRandomDistribution};
pub use simulation::{
    PairGenerator, PairSimulation, SimulatedPair, SimulationError, write_stream,
};
