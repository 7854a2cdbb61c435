// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use crate::Clock;

/// Measures elapsed time through a [`Clock`].
///
/// Create one with [`Clock::stopwatch()`] or [`Stopwatch::new()`]. Elapsed time is
/// monotonic and, when the clock is test-controlled, follows controlled time.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use pulse::Clock;
///
/// # fn measure(clock: &Clock) -> Duration {
/// let stopwatch = clock.stopwatch();
/// // Perform some operation...
/// stopwatch.elapsed()
/// # }
/// ```
#[derive(Debug)]
pub struct Stopwatch {
    clock: Clock,
    started: Instant,
}

impl Stopwatch {
    /// Creates a stopwatch that starts measuring now.
    ///
    /// > **Note**: [`Clock::stopwatch()`] is a shortcut for this constructor.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            started: clock.instant(),
        }
    }

    /// Returns the time elapsed since the stopwatch was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.clock.instant().saturating_duration_since(self.started)
    }
}

impl From<Stopwatch> for Instant {
    fn from(stopwatch: Stopwatch) -> Self {
        stopwatch.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimeControl;

    static_assertions::assert_impl_all!(Stopwatch: Send, Sync);

    #[test]
    fn elapsed_follows_controlled_time() {
        let control = TimeControl::new();
        let clock = control.to_clock();
        let stopwatch = clock.stopwatch();

        assert_eq!(stopwatch.elapsed(), Duration::ZERO);

        control.advance(Duration::from_millis(250));
        assert_eq!(stopwatch.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn into_instant_returns_start() {
        let clock = Clock::new_frozen();
        let start = clock.instant();
        let stopwatch = clock.stopwatch();

        assert_eq!(Instant::from(stopwatch), start);
    }
}
