//! The accept/reject decision on a normalized pulse shape.
use pulse_lifetime_common::Real;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};
use thiserror::Error;

/// Decides whether a normalized, peak-centred waveform is a good pulse.
/// Implementations must be deterministic for a fixed input.
pub trait PulseClassifier {
    fn classify(&self, waveform: &[Real]) -> bool;
}

impl<F> PulseClassifier for F
where
    F: Fn(&[Real]) -> bool,
{
    fn classify(&self, waveform: &[Real]) -> bool {
        self(waveform)
    }
}

/// Accepts every waveform.
#[derive(Default, Debug, Clone, Copy)]
pub struct AcceptAll;

impl PulseClassifier for AcceptAll {
    fn classify(&self, _: &[Real]) -> bool {
        true
    }
}

/// The label returned by an external predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Prediction {
    Reject,
    Accept,
}

impl Prediction {
    /// Maps the `{0, 1}` predictor contract, `1` accepting.
    pub fn from_label(label: u8) -> Option<Self> {
        match label {
            0 => Some(Prediction::Reject),
            1 => Some(Prediction::Accept),
            _ => None,
        }
    }
}

impl From<Prediction> for bool {
    fn from(prediction: Prediction) -> Self {
        prediction == Prediction::Accept
    }
}

/// Adapts a predictor returning `{0, 1}` labels. Any other label rejects.
pub struct LabelClassifier<F>(pub F);

impl<F: Fn(&[Real]) -> u8> PulseClassifier for LabelClassifier<F> {
    fn classify(&self, waveform: &[Real]) -> bool {
        Prediction::from_label((self.0)(waveform)).is_some_and(bool::from)
    }
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid reference shape: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Reference shape is empty")]
    EmptyReference,
    #[error("Tolerance must be a non-negative number, got {0}")]
    InvalidTolerance(Real),
}

/// Accepts waveforms whose RMS deviation from a stored normalized shape is within `tolerance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReferenceShapeClassifier {
    reference: Vec<Real>,
    tolerance: Real,
}

impl ReferenceShapeClassifier {
    pub fn new(reference: Vec<Real>, tolerance: Real) -> Result<Self, ClassifierError> {
        let classifier = Self {
            reference,
            tolerance,
        };
        classifier.validate()?;
        Ok(classifier)
    }

    /// Reads a `{"reference": [...], "tolerance": ...}` JSON document.
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let classifier: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        classifier.validate()?;
        Ok(classifier)
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        if self.reference.is_empty() {
            return Err(ClassifierError::EmptyReference);
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(ClassifierError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }

    pub fn reference(&self) -> &[Real] {
        &self.reference
    }

    /// Root mean square difference between `waveform` and the reference,
    /// or `None` if their lengths differ.
    pub fn deviation(&self, waveform: &[Real]) -> Option<Real> {
        (waveform.len() == self.reference.len()).then(|| {
            let sum_of_squares: Real = waveform
                .iter()
                .zip(&self.reference)
                .map(|(w, r)| (w - r).powi(2))
                .sum();
            (sum_of_squares / self.reference.len() as Real).sqrt()
        })
    }

    /// Accepts when the deviation from the reference is within tolerance.
    pub fn predict(&self, waveform: &[Real]) -> Prediction {
        match self.deviation(waveform) {
            Some(deviation) if deviation <= self.tolerance => Prediction::Accept,
            _ => Prediction::Reject,
        }
    }
}

impl PulseClassifier for ReferenceShapeClassifier {
    fn classify(&self, waveform: &[Real]) -> bool {
        self.predict(waveform).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::io::Write;

    #[test]
    fn accept_all() {
        assert!(AcceptAll.classify(&[]));
        assert!(AcceptAll.classify(&[1.0, 2.0]));
    }

    #[test]
    fn closure_classifier() {
        let classifier = |waveform: &[Real]| waveform.iter().all(|v| *v <= 1.0);
        assert!(classifier.classify(&[0.0, 1.0]));
        assert!(!classifier.classify(&[0.0, 1.5]));

        let boxed: Box<dyn PulseClassifier> = Box::new(classifier);
        assert!(boxed.classify(&[0.5]));
    }

    #[test]
    fn prediction_labels() {
        assert_eq!(Prediction::from_label(0), Some(Prediction::Reject));
        assert_eq!(Prediction::from_label(1), Some(Prediction::Accept));
        assert_eq!(Prediction::from_label(2), None);
        assert!(bool::from(Prediction::Accept));
        assert!(!bool::from(Prediction::Reject));
    }

    #[test]
    fn label_classifier() {
        let classifier = LabelClassifier(|waveform: &[Real]| waveform.len() as u8);
        assert!(!classifier.classify(&[]));
        assert!(classifier.classify(&[0.0]));
        assert!(!classifier.classify(&[0.0, 0.0]));

        let boxed: Box<dyn PulseClassifier> = Box::new(LabelClassifier(|_: &[Real]| 1u8));
        assert!(boxed.classify(&[0.5]));
    }

    #[test]
    fn reference_shape_tolerance() {
        let classifier = ReferenceShapeClassifier::new(vec![0.0, 0.5, 1.0, 0.5], 0.1).unwrap();
        assert!(classifier.classify(&[0.0, 0.5, 1.0, 0.5]));
        assert_eq!(classifier.predict(&[0.0, 0.5, 1.0, 0.5]), Prediction::Accept);
        assert_approx_eq!(classifier.deviation(&[0.0, 0.5, 1.0, 0.7]).unwrap(), 0.1);
        assert!(!classifier.classify(&[0.0, 0.5, 1.0, 0.8]));
        assert!(!classifier.classify(&[0.0, 0.5, 1.0]));
    }

    #[test]
    fn invalid_reference_shape() {
        assert!(matches!(
            ReferenceShapeClassifier::new(vec![], 0.1),
            Err(ClassifierError::EmptyReference)
        ));
        assert!(matches!(
            ReferenceShapeClassifier::new(vec![1.0], -0.1),
            Err(ClassifierError::InvalidTolerance(_))
        ));
    }

    #[test]
    fn load_reference_shape() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"reference": [0.0, 1.0, 0.0], "tolerance": 0.25}}"#).unwrap();
        let classifier = ReferenceShapeClassifier::load(file.path()).unwrap();
        assert_eq!(classifier.reference(), &[0.0, 1.0, 0.0]);
        assert!(classifier.classify(&[0.0, 0.9, 0.1]));
    }
}
