// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ops::ControlFlow;
use std::time::Duration;

use pulse::Clock;
use serde_json::Value;

use crate::Failure;
use crate::config::RetryPolicy;

/// The factor controlling the jitter range; 0.5 yields delays in `[0.75d, 1.25d]`.
const JITTER_FACTOR: f64 = 0.5;

/// One attempt of a retried operation, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Attempt {
    number: u32,
    max_attempts: u32,
}

impl Attempt {
    pub(crate) fn first(max_attempts: u32) -> Self {
        Self {
            number: 1,
            max_attempts: max_attempts.max(1),
        }
    }

    pub(crate) const fn number(self) -> u32 {
        self.number
    }

    pub(crate) const fn is_last(self) -> bool {
        self.number >= self.max_attempts
    }

    fn next(self) -> Self {
        Self {
            number: self.number.saturating_add(1),
            max_attempts: self.max_attempts,
        }
    }
}

/// Produces the delay sequence `multiplier^(n-1) * base`, optionally clamped and
/// jittered.
#[derive(Debug, Clone)]
pub(crate) struct BackoffSchedule {
    base: Duration,
    multiplier: f64,
    max: Option<Duration>,
    jitter: bool,
}

impl BackoffSchedule {
    pub(crate) fn from_policy(policy: &RetryPolicy) -> Self {
        Self {
            base: policy.base_delay,
            multiplier: policy.backoff_multiplier,
            max: policy.max_delay,
            jitter: policy.jitter,
        }
    }

    /// The delays to wait before the 2nd, 3rd, ... attempt.
    pub(crate) fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let schedule = self.clone();
        (0u32..).map(move |n| schedule.delay_for(n))
    }

    fn delay_for(&self, exponent: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }

        let factor = self.multiplier.powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let mut delay = saturating_from_secs(self.base.as_secs_f64() * factor);

        if self.jitter {
            delay = apply_jitter(delay);
        }

        match self.max {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Applies a symmetric, uniform jitter centered on `delay`.
fn apply_jitter(delay: Duration) -> Duration {
    let ms = delay.as_secs_f64() * 1000.0;
    let spread = ms * JITTER_FACTOR;
    let jittered = spread.mul_add(fastrand::f64() - 0.5, ms);
    saturating_from_secs(jittered / 1000.0)
}

fn saturating_from_secs(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Runs `invoke` up to `policy.max_attempts` times, waiting the backoff delay between
/// attempts.
///
/// An attempt is followed by another only when the operation is `retryable` under the
/// policy, the failure is classified transient, and attempts remain. Every attempt,
/// success or failure, reports once through `on_attempt` before the retry decision is
/// made, so the metrics log sees each attempt tagged with its number.
pub(crate) async fn run_with_retry<F, Fut, R>(
    clock: &Clock,
    policy: &RetryPolicy,
    retryable: bool,
    invoke: F,
    mut on_attempt: R,
) -> (Result<Value, Failure>, u32)
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Value, Failure>>,
    R: FnMut(&Attempt, &Result<Value, Failure>, Duration),
{
    let schedule = BackoffSchedule::from_policy(policy);
    let mut delays = schedule.delays();
    let mut attempt = Attempt::first(if retryable { policy.max_attempts } else { 1 });

    loop {
        let stopwatch = clock.stopwatch();
        let outcome = invoke(attempt.number()).await;
        on_attempt(&attempt, &outcome, stopwatch.elapsed());

        match evaluate(outcome, attempt, retryable) {
            ControlFlow::Break(result) => return (result, attempt.number()),
            ControlFlow::Continue(failure) => {
                let delay = delays.next().unwrap_or(Duration::ZERO);

                tracing::event!(
                    name: "valet.retry",
                    tracing::Level::WARN,
                    attempt = attempt.number(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    failure = %failure,
                );

                clock.delay(delay).await;
                attempt = attempt.next();
            }
        }
    }
}

fn evaluate(
    outcome: Result<Value, Failure>,
    attempt: Attempt,
    retryable: bool,
) -> ControlFlow<Result<Value, Failure>, Failure> {
    match outcome {
        Ok(value) => ControlFlow::Break(Ok(value)),
        Err(failure) => {
            if retryable && failure.is_transient() && !attempt.is_last() {
                ControlFlow::Continue(failure)
            } else {
                ControlFlow::Break(Err(failure))
            }
        }
    }
}
