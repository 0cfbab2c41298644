//! Startup staggering for sibling workers.

use rand::Rng;
use std::time::Duration;

/// Spreads sibling start times around a base delay.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StartupStagger {
    delay: Duration,
    jitter: Duration,
}

impl StartupStagger {
    /// Creates a stagger with the given base delay and total jitter width.
    #[must_use]
    pub fn new(delay: Duration, jitter: Duration) -> Self {
        Self { delay, jitter }
    }

    /// A stagger that never delays.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Delay for the sibling at `index`.
    ///
    /// Index 0 starts immediately. Others get `delay + U(-jitter/2, jitter/2)`,
    /// clamped at zero.
    #[must_use]
    pub fn sample(&self, index: usize) -> Duration {
        self.sample_with(index, &mut rand::thread_rng())
    }

    /// Same as [`sample`](Self::sample) with a caller-supplied generator.
    pub fn sample_with<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Duration {
        if index == 0 {
            return Duration::ZERO;
        }
        if self.jitter.is_zero() {
            return self.delay;
        }

        let half = self.jitter.as_secs_f64() / 2.0;
        let offset = rng.gen_range(-half..=half);
        let seconds = (self.delay.as_secs_f64() + offset).max(0.0);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }
}
