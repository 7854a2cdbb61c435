// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use crate::Clock;
use crate::queue::TimerId;

/// A future that completes after a duration has passed.
///
/// The delay schedules a one-shot timer against its [`Clock`] on first poll. Precision
/// follows whatever drives the clock's timer queue; the only guarantee is that the
/// delay does not complete early relative to the clock's time.
///
/// A delay of [`Duration::ZERO`] completes immediately; a delay of [`Duration::MAX`]
/// never completes and never schedules a timer.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use pulse::{Clock, Delay};
///
/// # async fn delay_example(clock: &Clock) {
/// let stopwatch = clock.stopwatch();
///
/// Delay::new(clock, Duration::from_millis(10)).await;
///
/// assert!(stopwatch.elapsed() >= Duration::from_millis(10));
/// # }
/// ```
#[derive(Debug)]
pub struct Delay {
    clock: Clock,
    duration: Duration,
    // The scheduled timer; populated on first poll.
    scheduled: Option<TimerId>,
}

impl Delay {
    /// Creates a delay that completes after `duration`.
    ///
    /// > **Note**: [`Clock::delay()`] is a shortcut for this constructor.
    #[must_use]
    pub fn new(clock: &Clock, duration: Duration) -> Self {
        Self {
            clock: clock.clone(),
            duration,
            scheduled: None,
        }
    }

    fn schedule(&mut self, waker: &Waker) -> Poll<()> {
        match self.clock.instant().checked_add(self.duration) {
            Some(deadline) => {
                self.scheduled = Some(self.clock.schedule_timer(deadline, waker.clone()));
            }
            None => {
                // The deadline overflows Instant; treat the delay as never completing.
                self.duration = Duration::MAX;
                self.scheduled = None;
            }
        }

        Poll::Pending
    }
}

impl Future for Delay {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match this.scheduled {
            None if this.duration == Duration::MAX => Poll::Pending,
            None if this.duration == Duration::ZERO => Poll::Ready(()),
            None => this.schedule(cx.waker()),
            Some(id) if id.deadline() <= this.clock.instant() => {
                this.scheduled = None;

                // The timer may still sit in the queue if this poll was not caused by
                // it firing; cancelling is a no-op otherwise.
                this.clock.cancel_timer(id);

                Poll::Ready(())
            }
            Some(_) => Poll::Pending,
        }
    }
}

impl Drop for Delay {
    fn drop(&mut self) {
        if let Some(id) = self.scheduled {
            self.clock.cancel_timer(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimeControl;

    static_assertions::assert_impl_all!(Delay: Send, Sync);

    fn poll_delay(delay: &mut Delay) -> Poll<()> {
        let mut cx = Context::from_waker(Waker::noop());
        std::pin::pin!(delay).poll(&mut cx)
    }

    #[test]
    fn completes_when_time_advances() {
        let control = TimeControl::new();
        let clock = control.to_clock();
        let mut delay = Delay::new(&clock, Duration::from_millis(1));

        assert_eq!(poll_delay(&mut delay), Poll::Pending);
        assert_eq!(poll_delay(&mut delay), Poll::Pending);

        control.advance(Duration::from_millis(2));
        assert_eq!(poll_delay(&mut delay), Poll::Ready(()));
    }

    #[test]
    fn zero_completes_immediately_without_timer() {
        let clock = Clock::new_frozen();
        let mut delay = Delay::new(&clock, Duration::ZERO);

        assert_eq!(poll_delay(&mut delay), Poll::Ready(()));
        assert_eq!(clock.timers_len(), 0);
    }

    #[test]
    fn max_never_schedules() {
        let clock = Clock::new_frozen();
        let mut delay = Delay::new(&clock, Duration::MAX);

        assert_eq!(poll_delay(&mut delay), Poll::Pending);
        assert!(delay.scheduled.is_none());
        assert_eq!(clock.timers_len(), 0);
    }

    #[test]
    fn near_max_degrades_to_never() {
        let clock = Clock::new_frozen();
        let mut delay = Delay::new(&clock, Duration::MAX - Duration::from_millis(1));

        assert_eq!(poll_delay(&mut delay), Poll::Pending);
        assert_eq!(delay.duration, Duration::MAX);
        assert!(delay.scheduled.is_none());
    }

    #[test]
    fn drop_cancels_timer() {
        let clock = Clock::new_frozen();

        {
            let mut delay = Delay::new(&clock, Duration::from_millis(1));
            assert_eq!(poll_delay(&mut delay), Poll::Pending);
            assert_eq!(clock.timers_len(), 1);
        }

        assert_eq!(clock.timers_len(), 0);
    }

    #[test]
    fn ready_poll_removes_timer_registration() {
        let control = TimeControl::new();
        let clock = control.to_clock();
        let mut delay = Delay::new(&clock, Duration::from_millis(1));

        assert_eq!(poll_delay(&mut delay), Poll::Pending);
        assert_eq!(clock.timers_len(), 1);

        control.advance(Duration::from_millis(1));
        assert_eq!(poll_delay(&mut delay), Poll::Ready(()));
        assert_eq!(delay.scheduled, None);
        assert_eq!(clock.timers_len(), 0);
    }

    #[tokio::test]
    async fn completes_under_tokio_driver() {
        let clock = Clock::new_tokio();
        let start = std::time::Instant::now();

        Delay::new(&clock, Duration::from_millis(5)).await;

        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
