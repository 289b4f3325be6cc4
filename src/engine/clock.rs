use spin_sleep::{SpinSleeper, SpinStrategy};
use std::time::{Duration, Instant};

/// Monotonic time source for playback.
pub trait Clock {
    /// Time since the clock was created.
    fn elapsed(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant`, sleeping with a spin sleeper for sub-millisecond accuracy.
#[derive(Debug)]
pub struct SpinClock {
    origin: Instant,
    sleeper: SpinSleeper,
}

impl SpinClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
        }
    }
}

impl Default for SpinClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SpinClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            self.sleeper.sleep(duration);
        }
    }
}

/// Test clock that only moves when slept on. Clones share the same time.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: std::rc::Rc<std::cell::Cell<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
