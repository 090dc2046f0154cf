use itertools::Itertools;
use pulse_lifetime_common::Real;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum SplineError {
    #[error("At least two knots are required, got {0}")]
    TooFewKnots(usize),
    #[error("Knot abscissae and ordinates differ in length: {x} and {y}")]
    LengthMismatch { x: usize, y: usize },
    #[error("Knot abscissae must be strictly increasing, violated at knot {0}")]
    NotIncreasing(usize),
    #[error("Spline system is singular")]
    Singular,
}

/// Interpolating cubic spline with not-a-knot end conditions.
///
/// Three knots give the interpolating parabola, two give the straight line.
#[derive(Debug, Clone)]
pub struct CubicSpline<'a> {
    knots: &'a [Real],
    values: &'a [Real],
    /// Second derivative at each knot.
    curvature: Vec<Real>,
}

impl<'a> CubicSpline<'a> {
    pub fn new(knots: &'a [Real], values: &'a [Real]) -> Result<Self, SplineError> {
        if knots.len() != values.len() {
            return Err(SplineError::LengthMismatch {
                x: knots.len(),
                y: values.len(),
            });
        }
        if knots.len() < 2 {
            return Err(SplineError::TooFewKnots(knots.len()));
        }
        if let Some(index) = knots
            .iter()
            .tuple_windows()
            .position(|(prior, next)| prior.partial_cmp(next) != Some(Ordering::Less))
        {
            return Err(SplineError::NotIncreasing(index + 1));
        }

        let curvature = match knots.len() {
            2 => vec![0.0; 2],
            3 => {
                let widths = [knots[1] - knots[0], knots[2] - knots[1]];
                let slopes = [
                    (values[1] - values[0]) / widths[0],
                    (values[2] - values[1]) / widths[1],
                ];
                vec![2.0 * (slopes[1] - slopes[0]) / (widths[0] + widths[1]); 3]
            }
            _ => not_a_knot_curvature(knots, values)?,
        };
        Ok(Self {
            knots,
            values,
            curvature,
        })
    }

    /// Value of the spline at `x`. Outside the knots the end polynomials are extended.
    pub fn evaluate(&self, x: Real) -> Real {
        let last = self.knots.len() - 2;
        let i = self
            .knots
            .partition_point(|&knot| knot <= x)
            .saturating_sub(1)
            .min(last);

        let width = self.knots[i + 1] - self.knots[i];
        let to_upper = self.knots[i + 1] - x;
        let from_lower = x - self.knots[i];
        let (m_lower, m_upper) = (self.curvature[i], self.curvature[i + 1]);

        m_lower * to_upper.powi(3) / (6.0 * width)
            + m_upper * from_lower.powi(3) / (6.0 * width)
            + (self.values[i] / width - m_lower * width / 6.0) * to_upper
            + (self.values[i + 1] / width - m_upper * width / 6.0) * from_lower
    }
}

/// Solves for the knot second derivatives of a spline through at least four knots.
///
/// The interior unknowns form a tridiagonal system whose first and last rows absorb the
/// not-a-knot conditions (continuous third derivative across the second and penultimate knots).
fn not_a_knot_curvature(knots: &[Real], values: &[Real]) -> Result<Vec<Real>, SplineError> {
    let n = knots.len();
    let widths: Vec<Real> = knots.iter().tuple_windows().map(|(a, b)| b - a).collect();
    let slopes: Vec<Real> = values
        .iter()
        .tuple_windows()
        .zip(&widths)
        .map(|((y0, y1), h)| (y1 - y0) / h)
        .collect();

    let unknowns = n - 2;
    let mut sub = vec![0.0; unknowns];
    let mut diag = vec![0.0; unknowns];
    let mut sup = vec![0.0; unknowns];
    let mut rhs = vec![0.0; unknowns];
    for row in 0..unknowns {
        let i = row + 1;
        sub[row] = widths[i - 1];
        diag[row] = 2.0 * (widths[i - 1] + widths[i]);
        sup[row] = widths[i];
        rhs[row] = 6.0 * (slopes[i] - slopes[i - 1]);
    }

    let (h0, h1) = (widths[0], widths[1]);
    diag[0] = (h0 + h1) * (h0 + 2.0 * h1) / h1;
    sup[0] = (h1 * h1 - h0 * h0) / h1;

    let (a, b) = (widths[n - 3], widths[n - 2]);
    sub[unknowns - 1] = (a * a - b * b) / a;
    diag[unknowns - 1] = (a + b) * (2.0 * a + b) / a;

    let interior = solve_tridiagonal(&sub, &diag, &sup, &rhs)?;

    let first = interior[0] + h0 / h1 * (interior[0] - interior[1]);
    let last =
        interior[unknowns - 1] + b / a * (interior[unknowns - 1] - interior[unknowns - 2]);

    Ok(std::iter::once(first)
        .chain(interior)
        .chain(std::iter::once(last))
        .collect())
}

/// Thomas algorithm. `sub[0]` and `sup[len - 1]` are ignored.
fn solve_tridiagonal(
    sub: &[Real],
    diag: &[Real],
    sup: &[Real],
    rhs: &[Real],
) -> Result<Vec<Real>, SplineError> {
    let len = diag.len();
    let mut upper = vec![0.0; len];
    let mut solution = vec![0.0; len];
    for row in 0..len {
        let (carried_upper, carried_rhs) = match row {
            0 => (0.0, 0.0),
            _ => (sub[row] * upper[row - 1], sub[row] * solution[row - 1]),
        };
        let pivot = diag[row] - carried_upper;
        if pivot == 0.0 || !pivot.is_finite() {
            return Err(SplineError::Singular);
        }
        upper[row] = sup[row] / pivot;
        solution[row] = (rhs[row] - carried_rhs) / pivot;
    }
    for row in (0..len.saturating_sub(1)).rev() {
        solution[row] -= upper[row] * solution[row + 1];
    }
    Ok(solution)
}
