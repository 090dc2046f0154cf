//! Constant-fraction timing of a conditioned pulse.
mod spline;

use pulse_lifetime_common::{Polarity, Real};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

pub use spline::{CubicSpline, SplineError};

/// Crossings at or before this sample index are too close to the trace start to interpolate.
const MINIMUM_CROSSING_INDEX: usize = 2;

/// Converts a difference of sample times (ns) to the spectrum's unit (ps).
const LIFETIME_SCALE: Real = 1000.0;

/// How the crossing time is resolved between the two samples straddling the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case", tag = "mode")]
#[strum(serialize_all = "kebab-case")]
pub enum Interpolation {
    Linear,
    /// Fit a spline through the whole trace and rescan `render_points` points between
    /// the straddling samples.
    #[serde(rename_all = "kebab-case")]
    CubicSpline { render_points: usize },
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::CubicSpline { render_points: 200 }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum CfdRejection {
    #[error("No threshold crossing before the extremum")]
    NoCrossing,
    #[error("Crossing at index {0} is too close to the start of the trace")]
    TooEarly(usize),
    #[error("Slope at the crossing does not match the polarity")]
    WrongSlope,
    #[error("Time and voltage traces differ in length: {time} and {voltage}")]
    LengthMismatch { time: usize, voltage: usize },
    #[error(transparent)]
    Spline(#[from] SplineError),
}

fn straddles(polarity: Polarity, previous: Real, current: Real, threshold: Real) -> bool {
    match polarity {
        Polarity::Negative => current <= threshold && previous >= threshold,
        Polarity::Positive => current >= threshold && previous <= threshold,
    }
}

/// Scans backward from `from` and returns the first `i` for which `y[i - 1]` and `y[i]`
/// straddle `threshold`.
fn find_crossing(y: &[Real], from: usize, threshold: Real, polarity: Polarity) -> Option<usize> {
    let from = from.min(y.len().saturating_sub(1));
    (1..=from)
        .rev()
        .find(|&i| straddles(polarity, y[i - 1], y[i], threshold))
}

/// Solves the line through samples `i - 1` and `i` for the time at which it meets `threshold`.
fn linear_crossing(
    x: &[Real],
    y: &[Real],
    i: usize,
    threshold: Real,
    polarity: Polarity,
) -> Result<Real, CfdRejection> {
    if i <= MINIMUM_CROSSING_INDEX {
        return Err(CfdRejection::TooEarly(i));
    }
    let slope = (y[i - 1] - y[i]) / (x[i - 1] - x[i]);
    let expected_sign = match polarity {
        Polarity::Negative => slope < 0.0,
        Polarity::Positive => slope > 0.0,
    };
    if !expected_sign || !slope.is_finite() {
        return Err(CfdRejection::WrongSlope);
    }
    let intercept = y[i] - slope * x[i];
    Ok((threshold - intercept) / slope)
}

/// Time at which the leading edge of the pulse `(x, y)` crosses `cfd_level` percent of
/// `amplitude`.
///
/// `amplitude` is the signed extremum of the conditioned, unnormalized trace.
#[tracing::instrument(skip_all, level = "trace")]
pub fn crossing_time(
    x: &[Real],
    y: &[Real],
    cfd_level: Real,
    amplitude: Real,
    polarity: Polarity,
    interpolation: Interpolation,
) -> Result<Real, CfdRejection> {
    if x.len() != y.len() {
        return Err(CfdRejection::LengthMismatch {
            time: x.len(),
            voltage: y.len(),
        });
    }
    let threshold = cfd_level * 0.01 * amplitude;
    let peak = polarity
        .extremum_index(y)
        .ok_or(CfdRejection::NoCrossing)?;
    let index = find_crossing(y, peak, threshold, polarity).ok_or(CfdRejection::NoCrossing)?;
    if index <= MINIMUM_CROSSING_INDEX {
        return Err(CfdRejection::TooEarly(index));
    }

    match interpolation {
        Interpolation::Linear => linear_crossing(x, y, index, threshold, polarity),
        Interpolation::CubicSpline { render_points } => {
            let spline = CubicSpline::new(x, y)?;
            let lower = x[index - 1];
            let step = (x[index] - lower).abs() / render_points as Real;
            let fine_x: Vec<Real> = (0..render_points)
                .map(|k| lower + k as Real * step)
                .collect();
            let fine_y: Vec<Real> = fine_x.iter().map(|&t| spline.evaluate(t)).collect();
            let fine_index =
                find_crossing(&fine_y, render_points.saturating_sub(1), threshold, polarity)
                    .ok_or(CfdRejection::NoCrossing)?;
            trace!(index, fine_index, "Resolved crossing on rendered spline");
            linear_crossing(&fine_x, &fine_y, fine_index, threshold, polarity)
        }
    }
}

/// A conditioned pulse ready for timing.
#[derive(Debug, Clone, Copy)]
pub struct TimedPulse<'a> {
    pub time: &'a [Real],
    pub voltage: &'a [Real],
    /// Signed extremum of `voltage`.
    pub amplitude: Real,
    /// Constant-fraction level, in percent.
    pub cfd_level: Real,
}

impl TimedPulse<'_> {
    pub fn crossing_time(&self, settings: &TimingSettings) -> Result<Real, CfdRejection> {
        crossing_time(
            self.time,
            self.voltage,
            self.cfd_level,
            self.amplitude,
            settings.polarity,
            settings.interpolation,
        )
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct TimingSettings {
    pub polarity: Polarity,
    pub interpolation: Interpolation,
}

/// Difference of the stop and start crossing times, in ps.
/// Rejected if either crossing is rejected.
pub fn lifetime(
    start: &TimedPulse,
    stop: &TimedPulse,
    settings: &TimingSettings,
) -> Result<Real, CfdRejection> {
    let start_time = start.crossing_time(settings)?;
    let stop_time = stop.crossing_time(settings)?;
    Ok(LIFETIME_SCALE * (stop_time - start_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Falls linearly by 10 mV per sample to -100 mV at index 10, then rises back.
    fn ramp() -> (Vec<Real>, Vec<Real>) {
        let x = (0..=20).map(|i| i as Real).collect();
        let y = (0..=20)
            .map(|i: i32| -10.0 * (10 - (10 - i).abs()) as Real)
            .collect();
        (x, y)
    }

    fn gaussian(sign: Real) -> (Vec<Real>, Vec<Real>) {
        let x: Vec<Real> = (0..=40).map(|i| 0.5 * i as Real).collect();
        let y = x
            .iter()
            .map(|t| sign * 100.0 * (-(t - 10.0).powi(2) / 8.0).exp())
            .collect();
        (x, y)
    }

    /// Half-maximum crossing of the leading edge of `gaussian`.
    fn gaussian_half_maximum() -> Real {
        10.0 - 2.0 * (2.0 * (2.0 as Real).ln()).sqrt()
    }

    #[test]
    fn linear_ramp_crossing_is_exact() {
        let (x, y) = ramp();
        let time = crossing_time(&x, &y, 25.0, -100.0, Polarity::Negative, Interpolation::Linear)
            .unwrap();
        assert_approx_eq!(time, 2.5);
    }

    #[test]
    fn linear_ramp_crossing_scales_with_time_base() {
        let (x, y) = ramp();
        let x: Vec<Real> = x.iter().map(|t| 0.5 * t + 3.0).collect();
        let time = crossing_time(&x, &y, 25.0, -100.0, Polarity::Negative, Interpolation::Linear)
            .unwrap();
        assert_approx_eq!(time, 4.25);
    }

    #[test]
    fn positive_ramp_crossing() {
        let (x, y) = ramp();
        let y: Vec<Real> = y.iter().map(|v| -v).collect();
        let time = crossing_time(&x, &y, 45.0, 100.0, Polarity::Positive, Interpolation::Linear)
            .unwrap();
        assert_approx_eq!(time, 4.5);
    }

    #[test]
    fn spline_is_closer_than_linear() {
        let (x, y) = gaussian(-1.0);
        let expected = gaussian_half_maximum();
        let linear = crossing_time(&x, &y, 50.0, -100.0, Polarity::Negative, Interpolation::Linear)
            .unwrap();
        let spline = crossing_time(
            &x,
            &y,
            50.0,
            -100.0,
            Polarity::Negative,
            Interpolation::default(),
        )
        .unwrap();
        assert_approx_eq!(spline, expected, 1e-3);
        assert!((spline - expected).abs() < (linear - expected).abs());
    }

    #[test]
    fn positive_spline_crossing() {
        let (x, y) = gaussian(1.0);
        let spline = crossing_time(
            &x,
            &y,
            50.0,
            100.0,
            Polarity::Positive,
            Interpolation::CubicSpline { render_points: 200 },
        )
        .unwrap();
        assert_approx_eq!(spline, gaussian_half_maximum(), 1e-3);
    }

    #[test]
    fn crossing_too_early() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [0.0, -10.0, -30.0, -100.0, -30.0, 0.0];
        assert_eq!(
            crossing_time(&x, &y, 25.0, -100.0, Polarity::Negative, Interpolation::Linear),
            Err(CfdRejection::TooEarly(2))
        );
    }

    /// Falls by 10 mV per sample to -100 mV at index 10, where the trace ends.
    /// A spline through it reproduces the line.
    fn falling_edge() -> (Vec<Real>, Vec<Real>) {
        let x = (0..=10).map(|i| i as Real).collect();
        let y = (0..=10).map(|i| -10.0 * i as Real).collect();
        (x, y)
    }

    const FINE: Interpolation = Interpolation::CubicSpline { render_points: 100 };

    #[test]
    fn spline_crossing_within_rendered_interval() {
        let (x, y) = falling_edge();
        let time = crossing_time(&x, &y, 35.0, -100.0, Polarity::Negative, FINE).unwrap();
        assert_approx_eq!(time, 3.5, 1e-9);
    }

    #[test]
    fn spline_crossing_at_start_of_rendered_interval() {
        // The samples at 3 and 4 ns straddle -30.05 mV, the rendered points at 3.00 and 3.01 ns.
        let (x, y) = falling_edge();
        assert_eq!(
            crossing_time(&x, &y, 30.05, -100.0, Polarity::Negative, FINE),
            Err(CfdRejection::TooEarly(1))
        );
    }

    #[test]
    fn spline_crossing_beyond_rendered_points() {
        // The last rendered point is 3.99 ns, before the spline reaches -39.95 mV.
        let (x, y) = falling_edge();
        assert_eq!(
            crossing_time(&x, &y, 39.95, -100.0, Polarity::Negative, FINE),
            Err(CfdRejection::NoCrossing)
        );
        assert_approx_eq!(
            crossing_time(&x, &y, 39.95, -100.0, Polarity::Negative, Interpolation::Linear)
                .unwrap(),
            3.995,
            1e-9
        );
    }

    #[test]
    fn no_crossing() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [-50.0, -60.0, -100.0, -60.0];
        assert_eq!(
            crossing_time(&x, &y, 25.0, -100.0, Polarity::Negative, Interpolation::Linear),
            Err(CfdRejection::NoCrossing)
        );
    }

    #[test]
    fn repeated_time_sample() {
        let (mut x, y) = ramp();
        x[2] = 3.0;
        assert_eq!(
            crossing_time(&x, &y, 25.0, -100.0, Polarity::Negative, Interpolation::Linear),
            Err(CfdRejection::WrongSlope)
        );
        assert_eq!(
            crossing_time(&x, &y, 25.0, -100.0, Polarity::Negative, Interpolation::default()),
            Err(CfdRejection::Spline(SplineError::NotIncreasing(3)))
        );
    }

    #[test]
    fn mismatched_lengths() {
        assert_eq!(
            crossing_time(
                &[0.0],
                &[0.0, 1.0],
                25.0,
                -1.0,
                Polarity::Negative,
                Interpolation::Linear
            ),
            Err(CfdRejection::LengthMismatch {
                time: 1,
                voltage: 2
            })
        );
    }

    #[test]
    fn lifetime_of_delayed_pulse() {
        let (x, y) = ramp();
        let delayed: Vec<Real> = x.iter().map(|t| t + 0.4).collect();
        let settings = TimingSettings {
            polarity: Polarity::Negative,
            interpolation: Interpolation::Linear,
        };
        let start = TimedPulse {
            time: &x,
            voltage: &y,
            amplitude: -100.0,
            cfd_level: 25.0,
        };
        let stop = TimedPulse {
            time: &delayed,
            ..start
        };
        assert_approx_eq!(lifetime(&start, &stop, &settings).unwrap(), 400.0, 1e-9);
        assert_approx_eq!(lifetime(&stop, &start, &settings).unwrap(), -400.0, 1e-9);
    }

    #[test]
    fn lifetime_rejected_by_either_channel() {
        let (x, y) = ramp();
        let flat = vec![0.0; x.len()];
        let settings = TimingSettings {
            polarity: Polarity::Negative,
            interpolation: Interpolation::Linear,
        };
        let good = TimedPulse {
            time: &x,
            voltage: &y,
            amplitude: -100.0,
            cfd_level: 25.0,
        };
        let bad = TimedPulse {
            voltage: &flat,
            ..good
        };
        assert!(lifetime(&good, &bad, &settings).is_err());
        assert!(lifetime(&bad, &good, &settings).is_err());
    }
}
