use rand::{Rng, distr::Uniform};
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("Invalid Uniform Distribution: {0}")]
    UniformDistribution(#[from] rand::distr::uniform::Error),
    #[error("Invalid Normal Distribution: {0}")]
    NormalDistribution(#[from] rand_distr::NormalError),
    #[error("Invalid Exponential Distribution: {0}")]
    ExpDistribution(#[from] rand_distr::ExpError),
}

/// A real-valued random quantity, as it appears in a simulation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "random-type")]
pub enum FloatRandomDistribution {
    Constant { value: f64 },
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, sd: f64 },
    Exponential { lifetime: f64 },
}

impl FloatRandomDistribution {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, DistributionError> {
        match self {
            Self::Constant { value } => Ok(*value),
            Self::Uniform { min, max } => Ok(Uniform::new_inclusive(*min, *max)?.sample(rng)),
            Self::Normal { mean, sd } => Ok(Normal::new(*mean, *sd)?.sample(rng)),
            Self::Exponential { lifetime } => Ok(Exp::new(1.0 / lifetime)?.sample(rng)),
        }
    }

    /// Expected value of the distribution.
    pub fn mean(&self) -> f64 {
        match self {
            Self::Constant { value } => *value,
            Self::Uniform { min, max } => (min + max) / 2.0,
            Self::Normal { mean, .. } => *mean,
            Self::Exponential { lifetime } => *lifetime,
        }
    }
}
