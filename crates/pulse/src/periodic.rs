// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use futures_core::Stream;

use crate::Clock;
use crate::queue::{TimerId, TIMER_RESOLUTION};

/// A stream that ticks on a fixed period.
///
/// The stream never completes; use combinators such as `StreamExt::take` to bound it.
/// Each tick is scheduled lazily when the stream is polled, so time spent processing a
/// tick pushes the next one back rather than causing a burst of catch-up ticks.
///
/// Periods shorter than 1ms are rounded up to 1ms.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use futures::StreamExt;
/// use pulse::{Clock, PeriodicTimer};
///
/// # async fn tick_example(clock: &Clock) {
/// let mut timer = PeriodicTimer::new(clock, Duration::from_millis(10));
///
/// while let Some(()) = timer.next().await {
///     // runs every 10ms
///     # break;
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct PeriodicTimer {
    clock: Clock,
    period: Duration,
    // The timer for the next tick; registered on poll.
    scheduled: Option<TimerId>,
}

impl PeriodicTimer {
    /// Creates a timer that ticks every `period`.
    #[must_use]
    pub fn new(clock: &Clock, period: Duration) -> Self {
        Self {
            clock: clock.clone(),
            period: period.max(TIMER_RESOLUTION),
            scheduled: None,
        }
    }

    fn schedule(&mut self, waker: Waker) {
        match self.clock.instant().checked_add(self.period) {
            Some(deadline) => {
                self.scheduled = Some(self.clock.schedule_timer(deadline, waker));
            }
            None => {
                // Too far in the future to ever fire; stop registering timers.
                self.period = Duration::MAX;
            }
        }
    }
}

impl Stream for PeriodicTimer {
    type Item = ();

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.period == Duration::MAX {
            return Poll::Pending;
        }

        match this.scheduled {
            Some(id) if id.deadline() <= this.clock.instant() => {
                this.scheduled = None;
                this.clock.cancel_timer(id);

                Poll::Ready(Some(()))
            }
            Some(_) => Poll::Pending,
            None => {
                this.schedule(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        if let Some(id) = self.scheduled {
            self.clock.cancel_timer(id);
        }
    }
}
