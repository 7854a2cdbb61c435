// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};
use std::task::Waker;
use std::time::{Duration, Instant, SystemTime};

use crate::queue::{TimerId, TimerQueue};

/// Provides an abstraction over time-related operations.
///
/// A clock retrieves the current absolute time (as [`SystemTime`]) and monotonic time
/// (as [`Instant`]), and creates the time primitives of this crate:
/// [`Delay`][crate::Delay], [`Stopwatch`][crate::Stopwatch],
/// [`PeriodicTimer`][crate::PeriodicTimer] and timeouts via
/// [`FutureExt::timeout`][crate::FutureExt::timeout].
///
/// In production the clock reads system time, and a runtime-driven task advances its
/// timer queue (see [`Clock::new_tokio`]). In tests, construct the clock from a
/// [`TimeControl`][crate::TimeControl] instead: time then only moves when the test says
/// so, which makes time-dependent code instant and deterministic to test.
///
/// # Cloning and shared state
///
/// Cloning a clock is an `Arc` clone. Every clone shares the same timer queue and, for
/// test clocks, the same controlled passage of time.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use pulse::Clock;
///
/// # async fn delay_example(clock: &Clock) {
/// let stopwatch = clock.stopwatch();
///
/// clock.delay(Duration::from_millis(10)).await;
///
/// assert!(stopwatch.elapsed() >= Duration::from_millis(10));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Clock(Arc<ClockCore>);

#[derive(Debug)]
pub(crate) enum ClockCore {
    /// Wall-clock time; the timer queue is advanced by a runtime driver task.
    System(SystemTimers),

    /// Time controlled by a test harness.
    #[cfg(any(feature = "test-util", test))]
    Manual(crate::TimeControl),
}

impl ClockCore {
    #[cfg(any(feature = "tokio", test))]
    fn system_timers(&self) -> Option<&SystemTimers> {
        match self {
            Self::System(timers) => Some(timers),
            #[cfg(any(feature = "test-util", test))]
            Self::Manual(_) => None,
        }
    }
}

/// The timer queue of a system-backed clock.
///
/// The mutex is uncontended in practice: it is taken when a timer is scheduled or
/// cancelled, and by the driver on its fixed resolution tick.
#[derive(Debug, Default)]
pub(crate) struct SystemTimers {
    queue: Mutex<TimerQueue>,
}

impl SystemTimers {
    pub(crate) fn with_queue<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut TimerQueue) -> R,
    {
        f(&mut self.queue.lock().expect("timer queue lock poisoned"))
    }
}

impl Clock {
    /// Creates a clock whose timers are driven by a background Tokio task.
    ///
    /// The driver advances the timer queue every 10ms and exits once every clone of
    /// the clock has been dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[cfg(any(feature = "tokio", test))]
    #[must_use]
    pub fn new_tokio() -> Self {
        /// How often the driver task advances the timer queue. 10ms balances timer
        /// precision against the overhead of waking the driver.
        const DRIVER_RESOLUTION: Duration = Duration::from_millis(10);

        let clock = Self(Arc::new(ClockCore::System(SystemTimers::default())));
        let weak = Arc::downgrade(&clock.0);

        drop(tokio::spawn(async move {
            loop {
                tokio::time::sleep(DRIVER_RESOLUTION).await;

                let Some(core) = weak.upgrade() else {
                    break;
                };

                match core.system_timers() {
                    Some(timers) => {
                        let _ = timers.with_queue(|q| q.fire_due(Instant::now()));
                    }
                    None => break,
                }
            }
        }));

        clock
    }

    /// Creates a clock whose time never moves.
    ///
    /// Equivalent to `TimeControl::new().to_clock()`. Useful in tests that need a
    /// stable timestamp but never await a timer.
    ///
    /// # Examples
    ///
    /// ```
    /// use pulse::Clock;
    ///
    /// let clock = Clock::new_frozen();
    ///
    /// let time = clock.system_time();
    /// let instant = clock.instant();
    ///
    /// assert_eq!(time, clock.system_time());
    /// assert_eq!(instant, clock.instant());
    /// ```
    #[cfg(any(feature = "test-util", test))]
    #[must_use]
    pub fn new_frozen() -> Self {
        crate::TimeControl::new().to_clock()
    }

    #[cfg(any(feature = "test-util", test))]
    pub(crate) fn from_control(control: &crate::TimeControl) -> Self {
        Self(Arc::new(ClockCore::Manual(control.clone())))
    }

    /// Used in tests that need a system clock without a driver; timers never advance.
    #[cfg(test)]
    pub(crate) fn new_system_undriven() -> Self {
        Self(Arc::new(ClockCore::System(SystemTimers::default())))
    }

    /// Retrieves the current absolute time.
    ///
    /// > **Note**: absolute time is not monotonic and can move backwards with system
    /// > clock changes. For elapsed-time measurements use
    /// > [`stopwatch`][Self::stopwatch] or [`instant`][Self::instant].
    #[must_use]
    pub fn system_time(&self) -> SystemTime {
        match self.core() {
            ClockCore::System(_) => SystemTime::now(),
            #[cfg(any(feature = "test-util", test))]
            ClockCore::Manual(control) => control.system_time(),
        }
    }

    /// Retrieves the current monotonic time.
    ///
    /// > **Important**: when measuring elapsed time against a controlled test clock,
    /// > use [`Instant::duration_since`] on instants read from the clock rather than
    /// > `Instant::elapsed`, which bypasses the clock.
    #[must_use]
    pub fn instant(&self) -> Instant {
        match self.core() {
            ClockCore::System(_) => Instant::now(),
            #[cfg(any(feature = "test-util", test))]
            ClockCore::Manual(control) => control.instant(),
        }
    }

    /// Creates a [`Delay`][crate::Delay] that completes after `duration`.
    ///
    /// A zero duration completes immediately; [`Duration::MAX`] never completes.
    #[must_use]
    pub fn delay(&self, duration: Duration) -> crate::Delay {
        crate::Delay::new(self, duration)
    }

    /// Creates a [`Stopwatch`][crate::Stopwatch] that starts measuring now.
    #[must_use]
    pub fn stopwatch(&self) -> crate::Stopwatch {
        crate::Stopwatch::new(self)
    }

    pub(crate) fn schedule_timer(&self, deadline: Instant, waker: Waker) -> TimerId {
        match self.core() {
            ClockCore::System(timers) => timers.with_queue(|q| q.schedule(deadline, waker)),
            #[cfg(any(feature = "test-util", test))]
            ClockCore::Manual(control) => control.schedule_timer(deadline, waker),
        }
    }

    pub(crate) fn cancel_timer(&self, id: TimerId) {
        match self.core() {
            ClockCore::System(timers) => timers.with_queue(|q| q.cancel(id)),
            #[cfg(any(feature = "test-util", test))]
            ClockCore::Manual(control) => control.cancel_timer(id),
        }
    }

    #[cfg(test)]
    pub(crate) fn timers_len(&self) -> usize {
        match self.core() {
            ClockCore::System(timers) => timers.with_queue(|q| q.len()),
            ClockCore::Manual(control) => control.timers_len(),
        }
    }

    fn core(&self) -> &ClockCore {
        self.0.as_ref()
    }
}

impl AsRef<Self> for Clock {
    fn as_ref(&self) -> &Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimeControl;

    static_assertions::assert_impl_all!(Clock: Send, Sync, Clone, AsRef<Clock>);

    #[test]
    fn system_time_moves_forward() {
        let before = SystemTime::now();
        let clock = Clock::new_system_undriven();

        assert!(clock.system_time() >= before);
    }

    #[test]
    fn controlled_system_time() {
        let control = TimeControl::new();
        let clock = control.to_clock();

        let now = clock.system_time();
        assert_eq!(now, control.system_time());

        control.advance(Duration::from_secs(10));

        assert_eq!(clock.system_time(), now + Duration::from_secs(10));
    }

    #[test]
    fn controlled_instant() {
        let control = TimeControl::new();
        let clock = control.to_clock();

        let now = clock.instant();
        control.advance(Duration::from_secs(3));

        assert_eq!(clock.instant().duration_since(now), Duration::from_secs(3));
    }

    #[test]
    fn frozen_clock_never_moves() {
        let clock = Clock::new_frozen();

        let time = clock.system_time();
        let instant = clock.instant();

        std::thread::sleep(Duration::from_micros(1));

        assert_eq!(time, clock.system_time());
        assert_eq!(instant, clock.instant());
    }

    #[tokio::test]
    async fn tokio_driver_advances_timers() {
        let clock = Clock::new_tokio();
        clock.delay(Duration::from_millis(15)).await;
    }

    #[test]
    fn schedule_and_cancel_with_system_clock() {
        let clock = Clock::new_system_undriven();
        let id = clock.schedule_timer(Instant::now(), Waker::noop().clone());

        assert_eq!(clock.timers_len(), 1);
        clock.cancel_timer(id);
        assert_eq!(clock.timers_len(), 0);
    }
}
