use pulse_lifetime_common::Real;

/// A stateful filter fed one sample at a time, emitting output once it holds enough history.
pub(crate) trait Window: Clone {
    type InputType: Copy;
    type OutputType;

    fn push(&mut self, value: Self::InputType) -> bool;
    fn output(&self) -> Option<Self::OutputType>;
    fn apply_time_shift(&self, time: Real) -> Real;
}

#[derive(Clone)]
pub(crate) struct WindowIter<I, W>
where
    I: Iterator<Item = (Real, W::InputType)>,
    W: Window,
{
    window_function: W,
    source: I,
}

impl<I, W> WindowIter<I, W>
where
    I: Iterator<Item = (Real, W::InputType)>,
    W: Window,
{
    pub fn new(source: I, window_function: W) -> Self {
        WindowIter {
            source,
            window_function,
        }
    }
}

impl<I, W> Iterator for WindowIter<I, W>
where
    I: Iterator<Item = (Real, W::InputType)>,
    W: Window,
{
    type Item = (Real, W::OutputType);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (time, value) = self.source.next()?;
            if self.window_function.push(value) {
                return Some((
                    self.window_function.apply_time_shift(time),
                    self.window_function.output()?,
                ));
            }
        }
    }
}

pub(crate) trait WindowFilter<I, W>
where
    I: Iterator<Item = (Real, W::InputType)>,
    W: Window,
{
    fn window(self, window: W) -> WindowIter<I, W>;
}

impl<I, W> WindowFilter<I, W> for I
where
    I: Iterator<Item = (Real, W::InputType)>,
    W: Window,
{
    fn window(self, window: W) -> WindowIter<I, W> {
        WindowIter::<I, W>::new(self, window)
    }
}
