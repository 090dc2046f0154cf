use super::ConditioningError;
use pulse_lifetime_common::Real;
use std::ops::Range;

/// The "pre" and "post" candidate windows for a trace of `len` samples.
///
/// The pre window is `[start_cell, cell_region)`, the post window is mirrored from the end as
/// `[len - 1 - start_cell - cell_region, len - 1 - start_cell)`. Both must be non-empty and lie
/// within the trace.
pub fn baseline_windows(
    len: usize,
    start_cell: usize,
    cell_region: usize,
) -> Result<(Range<usize>, Range<usize>), ConditioningError> {
    let pre = start_cell..cell_region;
    let post = len
        .checked_sub(1 + start_cell + cell_region)
        .zip(len.checked_sub(1 + start_cell))
        .map(|(start, end)| start..end);

    let in_bounds = |window: &Range<usize>| !window.is_empty() && window.end <= len;
    match post {
        Some(post) if in_bounds(&pre) && in_bounds(&post) => Ok((pre, post)),
        _ => Err(ConditioningError::BaselineWindow {
            start_cell,
            cell_region,
            len,
        }),
    }
}

/// Population mean and standard deviation.
fn mean_and_deviation(window: &[Real]) -> (Real, Real) {
    let n = window.len() as Real;
    let mean = window.iter().sum::<Real>() / n;
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<Real>() / n;
    (mean, variance.sqrt())
}

/// Subtracts from every sample the mean of whichever candidate window is quieter.
/// Ties go to the post window.
#[tracing::instrument(skip_all, level = "trace")]
pub fn baseline_correct(
    samples: &[Real],
    start_cell: usize,
    cell_region: usize,
) -> Result<Vec<Real>, ConditioningError> {
    let (pre, post) = baseline_windows(samples.len(), start_cell, cell_region)?;
    let (pre_mean, pre_deviation) = mean_and_deviation(&samples[pre]);
    let (post_mean, post_deviation) = mean_and_deviation(&samples[post]);

    let baseline = if pre_deviation < post_deviation {
        pre_mean
    } else {
        post_mean
    };
    Ok(samples.iter().map(|v| v - baseline).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn windows_of_default_geometry() {
        let (pre, post) = baseline_windows(1024, 10, 150).unwrap();
        assert_eq!(pre, 10..150);
        assert_eq!(post, 863..1013);
    }

    #[test]
    fn windows_out_of_range() {
        assert!(baseline_windows(100, 10, 150).is_err());
        assert!(baseline_windows(100, 10, 10).is_err());
        assert!(baseline_windows(100, 20, 10).is_err());
    }

    #[test]
    fn quiet_pre_window_is_chosen() {
        // pre = [1, 3), post = [3, 6)
        let samples = [9.0, 2.0, 2.0, 2.0, 1.0, 5.0, 3.0, 0.0];
        let corrected = baseline_correct(&samples, 1, 3).unwrap();
        assert_eq!(corrected.len(), samples.len());
        assert_approx_eq!(corrected[0], 7.0);
        assert_approx_eq!(corrected[5], 3.0);
    }

    #[test]
    fn quiet_post_window_is_chosen() {
        let samples = [9.0, 1.0, 5.0, 4.0, 4.0, 4.0, 0.0, 0.0];
        let corrected = baseline_correct(&samples, 1, 3).unwrap();
        assert_approx_eq!(corrected[0], 5.0);
        assert_approx_eq!(corrected[4], 0.0);
    }

    #[test]
    fn tie_chooses_post_window() {
        let samples = [0.0, 1.0, 1.0, 3.0, 3.0, 3.0, 0.0, 0.0];
        let corrected = baseline_correct(&samples, 1, 3).unwrap();
        assert_approx_eq!(corrected[1], -2.0);
    }
}
