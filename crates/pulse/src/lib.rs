// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Primitives for obtaining, working with, and mocking machine time.
//!
//! Time-dependent code is notoriously hard to test: delays slow test suites down and
//! wall-clock reads make outcomes irreproducible. This crate routes every time operation
//! through a [`Clock`] handle, which in production reads system time and in tests is
//! driven by a [`TimeControl`] that can advance time instantly and deterministically.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use pulse::Clock;
//!
//! async fn produce_value(clock: &Clock) -> u64 {
//!     let stopwatch = clock.stopwatch();
//!     clock.delay(Duration::from_secs(60)).await;
//!     println!("elapsed: {}ms", stopwatch.elapsed().as_millis());
//!     123
//! }
//! ```
//!
//! In production, construct the clock with [`Clock::new_tokio`] (behind the `tokio`
//! feature). In tests, the same function completes instantly:
//!
//! ```ignore
//! use pulse::TimeControl;
//!
//! #[tokio::test]
//! async fn test_produce_value() {
//!     // Jump straight to pending timers; the one-minute delay completes instantly.
//!     let clock = TimeControl::new().auto_advance_timers(true).to_clock();
//!     assert_eq!(produce_value(&clock).await, 123);
//! }
//! ```
//!
//! # Overview
//!
//! - [`Clock`] - the time source handle. Returns absolute time as `SystemTime` and
//!   monotonic time as `Instant`, and creates the other primitives.
//! - [`TimeControl`] - drives a test clock: manual [`advance`][TimeControl::advance],
//!   per-read [`auto_advance`][TimeControl::auto_advance], or
//!   [`auto_advance_timers`][TimeControl::auto_advance_timers] which chases registered
//!   timers. Available with the `test-util` feature.
//! - [`Delay`] - completes after a duration.
//! - [`Timeout`] / [`FutureExt::timeout`] - races a future against a deadline.
//! - [`PeriodicTimer`] - a stream that ticks on a fixed period.
//! - [`Stopwatch`] - measures elapsed time through the clock.
//!
//! # Runtime integration
//!
//! Timers are one-shot waker registrations in a queue owned by the clock. Something must
//! advance that queue: with the `tokio` feature, [`Clock::new_tokio`] spawns a background
//! driver task; in tests, [`TimeControl`] advances it as time is manipulated.

mod clock;
#[cfg(any(feature = "test-util", test))]
mod control;
mod delay;
mod periodic;
mod queue;
mod stopwatch;
mod timeout;

pub use clock::Clock;
#[cfg(any(feature = "test-util", test))]
pub use control::TimeControl;
pub use delay::Delay;
pub use periodic::PeriodicTimer;
pub use stopwatch::Stopwatch;
pub use timeout::{Elapsed, FutureExt, Timeout};
