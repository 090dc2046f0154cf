use super::window::{Window, WindowFilter};
use pulse_lifetime_common::Real;
use std::{collections::VecDeque, iter::repeat_n};

#[derive(Default, Clone)]
pub(crate) struct MedianWindow {
    values: VecDeque<Real>,
    size: usize,
}

impl MedianWindow {
    pub(crate) fn new(size: usize) -> Self {
        let size = size.max(1);
        MedianWindow {
            values: VecDeque::with_capacity(size),
            size,
        }
    }

    pub(crate) fn half_width(&self) -> usize {
        self.size / 2
    }
}

impl Window for MedianWindow {
    type InputType = Real;
    type OutputType = Real;

    fn push(&mut self, value: Real) -> bool {
        if self.values.len() == self.size {
            self.values.pop_front();
        }
        self.values.push_back(value);
        self.values.len() == self.size
    }

    fn output(&self) -> Option<Real> {
        if self.values.len() != self.size {
            return None;
        }
        let mut sorted: Vec<Real> = self.values.iter().copied().collect();
        let (_, median, _) = sorted.select_nth_unstable_by(self.half_width(), Real::total_cmp);
        Some(*median)
    }

    fn apply_time_shift(&self, time: Real) -> Real {
        time - self.half_width() as Real
    }
}

/// Sliding median of width `window_size` over `samples`.
///
/// Both ends are padded by repeating the first and last sample, so the output has the same
/// length as the input. The width is expected to be odd; this is not corrected here.
#[tracing::instrument(skip_all, level = "trace")]
pub fn median_filter(samples: &[Real], window_size: usize) -> Vec<Real> {
    let (Some(&first), Some(&last)) = (samples.first(), samples.last()) else {
        return Vec::new();
    };
    let window = MedianWindow::new(window_size);
    let half_width = window.half_width();
    repeat_n(first, half_width)
        .chain(samples.iter().copied())
        .chain(repeat_n(last, half_width))
        .enumerate()
        .map(|(i, v)| (i as Real, v))
        .window(window)
        .map(|(_, v)| v)
        .take(samples.len())
        .collect()
}
