// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project_lite::pin_project;

use crate::{Clock, Delay};

/// The error produced when a future does not complete within its time limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    limit: Duration,
}

impl Elapsed {
    /// The time limit that was exceeded.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "future timed out after {:?}", self.limit)
    }
}

impl std::error::Error for Elapsed {}

pin_project! {
    /// A future that races an inner future against a deadline.
    ///
    /// - If the inner future completes first, its output is returned.
    /// - If the deadline fires first, [`Elapsed`] is returned and the inner future is
    ///   dropped with this future.
    ///
    /// The inner future is always polled before the deadline, so a future that is
    /// ready on the same poll as its deadline wins the race.
    #[derive(Debug)]
    pub struct Timeout<F> {
        #[pin]
        future: F,
        #[pin]
        deadline: Delay,
        limit: Duration,
    }
}

impl<F> Timeout<F> {
    pub(crate) fn new(future: F, clock: &Clock, limit: Duration) -> Self {
        Self {
            future,
            deadline: Delay::new(clock, limit),
            limit,
        }
    }
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, Elapsed>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.future.poll(cx) {
            Poll::Ready(output) => Poll::Ready(Ok(output)),
            Poll::Pending => match this.deadline.poll(cx) {
                Poll::Ready(()) => Poll::Ready(Err(Elapsed { limit: *this.limit })),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

/// Extensions for the [`Future`] trait.
pub trait FutureExt: Future {
    /// Applies a time limit to the future.
    ///
    /// The limit is measured on the given [`Clock`], which makes timeouts
    /// controllable in tests.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use pulse::{Clock, Delay, FutureExt};
    ///
    /// # async fn timeout_example(clock: &Clock) {
    /// let slow = Delay::new(clock, Duration::from_millis(700));
    ///
    /// let error = slow
    ///     .timeout(clock, Duration::from_millis(200))
    ///     .await
    ///     .unwrap_err();
    ///
    /// assert_eq!(error.limit(), Duration::from_millis(200));
    /// # }
    /// ```
    fn timeout(self, clock: &Clock, limit: Duration) -> Timeout<Self>
    where
        Self: Sized,
    {
        Timeout::new(self, clock, limit)
    }
}

impl<T: Future> FutureExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimeControl;

    #[test]
    fn deadline_wins_with_auto_advance() {
        let control = TimeControl::new()
            .auto_advance(Duration::from_millis(200))
            .auto_advance_cap(Duration::from_millis(500));
        let clock = control.to_clock();

        let mut future = Delay::new(&clock, Duration::from_secs(10)).timeout(&clock, Duration::from_millis(200));

        let mut cx = Context::from_waker(std::task::Waker::noop());
        let mut pinned = std::pin::pin!(&mut future);

        // First polls advance the clock by 200ms per read until the deadline fires.
        let mut outcome = pinned.as_mut().poll(&mut cx);
        while outcome.is_pending() {
            outcome = pinned.as_mut().poll(&mut cx);
        }

        let Poll::Ready(Err(elapsed)) = outcome else {
            panic!("expected the timeout to elapse");
        };
        assert_eq!(elapsed.limit(), Duration::from_millis(200));
        assert_eq!(elapsed.to_string(), "future timed out after 200ms");
    }

    #[test]
    fn inner_future_wins() {
        let control = TimeControl::new().auto_advance_timers(true);
        let clock = control.to_clock();

        let future = async {
            Delay::new(&clock, Duration::from_millis(1)).await;
            10
        };

        let result = futures::executor::block_on(future.timeout(&clock, Duration::from_secs(60)));

        assert_eq!(result.expect("future should complete in time"), 10);
    }

    #[tokio::test]
    async fn timeout_under_tokio_driver() {
        let clock = Clock::new_tokio();

        let error = Delay::new(&clock, Duration::from_secs(10))
            .timeout(&clock, Duration::from_millis(10))
            .await
            .unwrap_err();

        assert_eq!(error.limit(), Duration::from_millis(10));
    }

    #[test]
    fn ready_future_never_times_out() {
        let clock = Clock::new_frozen();

        let result = futures::executor::block_on(async { 42 }.timeout(&clock, Duration::ZERO));

        assert_eq!(result.expect("ready future wins the race"), 42);
    }
}
