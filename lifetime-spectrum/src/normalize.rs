use pulse_lifetime_common::{Polarity, Real};
use tracing::trace;

/// Extremum positions before this fraction of the trace are too early to shape reliably.
const SAFETY_REGION_START: Real = 0.02;
/// Extremum positions after this fraction of the trace are too late to shape reliably.
const SAFETY_REGION_END: Real = 0.92;

/// A pulse rescaled to unit peak and circularly shifted so its extremum sits at the centre.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct NormalizedPulse {
    pub samples: Vec<Real>,
    /// Extremum of the input trace, or zero if the rescaled peak vanished.
    pub peak_value: Real,
    /// Index of the extremum in the input trace.
    pub peak_index: usize,
    pub valid: bool,
}

/// Area- then peak-normalizes `voltage` and centres its extremum at `number_of_cells / 2`.
///
/// An extremum outside the safety region marks the result invalid but does not stop
/// processing. A vanishing area or peak marks it invalid and returns early.
#[tracing::instrument(skip_all, level = "trace")]
pub fn normalize(voltage: &[Real], number_of_cells: usize, polarity: Polarity) -> NormalizedPulse {
    let Some(peak_index) = polarity.extremum_index(voltage) else {
        return NormalizedPulse::default();
    };
    let peak_value = voltage[peak_index];

    let cells = number_of_cells as Real;
    let position = peak_index as Real;
    let mut valid = true;
    if position < SAFETY_REGION_START * cells || position > SAFETY_REGION_END * cells {
        trace!(peak_index, "Extremum outside safety region");
        valid = false;
    }

    let area = voltage.iter().sum::<Real>().abs();
    if area == 0.0 || !area.is_finite() {
        return NormalizedPulse {
            samples: voltage.to_vec(),
            peak_value,
            peak_index,
            valid: false,
        };
    }
    let scaled: Vec<Real> = voltage.iter().map(|v| v / area).collect();

    let rescaled_index = match polarity.extremum_index(&scaled) {
        Some(index) if index < number_of_cells => index,
        _ => {
            return NormalizedPulse {
                samples: scaled,
                peak_value,
                peak_index,
                valid: false,
            };
        }
    };
    let rescaled_peak = scaled[rescaled_index];
    if rescaled_peak == 0.0 {
        return NormalizedPulse {
            samples: scaled,
            peak_value: 0.0,
            peak_index,
            valid: false,
        };
    }

    let len = scaled.len();
    let shift = len - rescaled_index + number_of_cells / 2;
    let mut samples = vec![0.0; len];
    for (i, value) in scaled.iter().enumerate() {
        samples[(i + shift) % len] = value / rescaled_peak;
    }

    NormalizedPulse {
        samples,
        peak_value,
        peak_index,
        valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn triangle(len: usize, centre: usize, height: Real) -> Vec<Real> {
        let mut samples = vec![0.0; len];
        samples[centre - 1] = height / 2.0;
        samples[centre] = height;
        samples[centre + 1] = height / 2.0;
        samples
    }

    #[test]
    fn positive_pulse_is_centred() {
        let pulse = normalize(&triangle(10, 3, 4.0), 10, Polarity::Positive);
        assert!(pulse.valid);
        assert_eq!(pulse.peak_index, 3);
        assert_approx_eq!(pulse.peak_value, 4.0);
        assert_approx_eq!(pulse.samples[5], 1.0);
        assert_approx_eq!(pulse.samples[4], 0.5);
        assert_approx_eq!(pulse.samples[6], 0.5);
        assert_approx_eq!(pulse.samples[0], 0.0);
    }

    #[test]
    fn negative_pulse_is_centred_at_unit_peak() {
        let pulse = normalize(&triangle(10, 3, -8.0), 10, Polarity::Negative);
        assert!(pulse.valid);
        assert_approx_eq!(pulse.peak_value, -8.0);
        assert_approx_eq!(pulse.samples[5], 1.0);
        assert_approx_eq!(pulse.samples[6], 0.5);
    }

    #[test]
    fn centring_wraps_around() {
        let pulse = normalize(&triangle(10, 8, 2.0), 10, Polarity::Positive);
        assert!(pulse.valid);
        assert_approx_eq!(pulse.samples[5], 1.0);
        assert_approx_eq!(pulse.samples[4], 0.5);
        assert_approx_eq!(pulse.samples[6], 0.5);
    }

    #[test]
    fn safety_region_boundaries() {
        assert!(normalize(&triangle(1000, 20, 1.0), 1000, Polarity::Positive).valid);
        assert!(!normalize(&triangle(1000, 19, 1.0), 1000, Polarity::Positive).valid);
        assert!(normalize(&triangle(1000, 920, 1.0), 1000, Polarity::Positive).valid);
        assert!(!normalize(&triangle(1000, 921, 1.0), 1000, Polarity::Positive).valid);
    }

    #[test]
    fn edge_pulse_is_still_shaped() {
        let pulse = normalize(&triangle(1000, 10, -3.0), 1000, Polarity::Negative);
        assert!(!pulse.valid);
        assert_approx_eq!(pulse.samples[500], 1.0);
    }

    #[test]
    fn zero_area_is_invalid() {
        let mut samples = vec![0.0; 100];
        samples[50] = 1.0;
        samples[60] = -1.0;
        let pulse = normalize(&samples, 100, Polarity::Positive);
        assert!(!pulse.valid);
        assert_eq!(pulse.samples, samples);
    }

    #[test]
    fn zero_peak_is_invalid() {
        let mut samples = vec![-1.0; 100];
        samples[50] = 0.0;
        let pulse = normalize(&samples, 100, Polarity::Positive);
        assert!(!pulse.valid);
        assert_eq!(pulse.peak_value, 0.0);
    }

    #[test]
    fn empty_trace_is_invalid() {
        assert!(!normalize(&[], 0, Polarity::Negative).valid);
    }

    #[test]
    fn renormalizing_keeps_unit_peak_at_centre() {
        let samples: Vec<Real> = (0..64)
            .map(|i| -50.0 * (-((i as Real - 20.0).powi(2)) / 18.0).exp())
            .collect();
        let first = normalize(&samples, 64, Polarity::Negative);
        assert!(first.valid);
        assert_eq!(first.peak_index, 20);

        let second = normalize(&first.samples, 64, Polarity::Positive);
        assert!(second.valid);
        assert_eq!(second.peak_index, 32);
        assert_approx_eq!(second.peak_value, 1.0);
        assert_approx_eq!(second.samples[32], 1.0);
        for (a, b) in first.samples.iter().zip(&second.samples) {
            assert_approx_eq!(*a, *b, 1e-12);
        }
    }
}
