// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};
use std::task::Waker;
use std::time::{Duration, Instant, SystemTime};

use crate::Clock;
use crate::queue::{TimerId, TimerQueue};

/// Controls the flow of time in tests.
///
/// `TimeControl` owns the state behind a test [`Clock`]: the current time, the timer
/// queue, and the advancement policy. It is available when the `test-util` feature is
/// enabled and must never be used in production code.
///
/// Three advancement modes compose:
///
/// - **Manual**: [`advance`][Self::advance] / [`advance_to`][Self::advance_to] move
///   time explicitly and fire any timers that become due.
/// - **Per-read auto-advance**: [`auto_advance`][Self::auto_advance] moves time by a
///   fixed step each time the clock is read, optionally bounded by
///   [`auto_advance_cap`][Self::auto_advance_cap]. Useful to let a short deadline fire
///   while a longer one stays pending.
/// - **Timer chasing**: [`auto_advance_timers`][Self::auto_advance_timers] jumps
///   straight to the next registered timer whenever one is due, so delays and backoff
///   waits complete instantly.
///
/// # Examples
///
/// ## Advancing time manually
///
/// ```
/// use std::time::Duration;
///
/// use pulse::TimeControl;
///
/// let control = TimeControl::new();
/// let clock = control.to_clock();
///
/// let now = clock.instant();
/// control.advance(Duration::from_secs(1));
///
/// assert_eq!(clock.instant().duration_since(now), Duration::from_secs(1));
/// ```
///
/// ## Chasing timers
///
/// ```
/// use std::time::Duration;
///
/// use pulse::TimeControl;
///
/// # futures::executor::block_on(async {
/// let clock = TimeControl::new().auto_advance_timers(true).to_clock();
///
/// // Completes instantly; the control jumps to the timer's deadline.
/// clock.delay(Duration::from_secs(3600)).await;
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct TimeControl {
    // Time flows across threads in tests, so the state sits behind a mutex shared by
    // every clone of the control and every clock created from it.
    state: Arc<Mutex<ControlState>>,
}

impl TimeControl {
    /// Creates a control whose clock starts at the UNIX epoch and does not advance
    /// on its own.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a control whose clock starts at the given absolute time.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::{Duration, SystemTime};
    ///
    /// use pulse::TimeControl;
    ///
    /// let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    /// let clock = TimeControl::starting_at(start).to_clock();
    ///
    /// assert_eq!(clock.system_time(), start);
    /// ```
    #[must_use]
    pub fn starting_at(time: impl Into<SystemTime>) -> Self {
        let this = Self::new();
        this.advance_to(time);
        this
    }

    /// Creates a control whose clock starts at the current system time.
    #[must_use]
    pub fn now() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// Creates a [`Clock`] driven by this control.
    #[must_use]
    pub fn to_clock(&self) -> Clock {
        Clock::from_control(self)
    }

    /// Sets the step by which time advances each time the clock is read.
    ///
    /// Each read returns the time *before* the step is applied.
    #[must_use]
    pub fn auto_advance(self, step: Duration) -> Self {
        self.with_state(|s| s.auto_advance = step);
        self
    }

    /// Caps the total time that auto-advancement (per-read steps and timer chasing)
    /// may accumulate. Once the cap is reached, time only moves manually.
    ///
    /// The cap is what keeps a far-away deadline from firing while closer timers are
    /// being chased.
    #[must_use]
    pub fn auto_advance_cap(self, cap: Duration) -> Self {
        self.with_state(|s| s.auto_advance_cap = Some(cap));
        self
    }

    /// When enabled, the control jumps straight to the next registered timer,
    /// repeatedly, until no timer is pending or the auto-advance cap is reached.
    #[must_use]
    pub fn auto_advance_timers(self, enabled: bool) -> Self {
        self.with_state(|s| {
            s.chase_timers = enabled;
            s.chase();
        });
        self
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Advances the clock by `step`, firing every timer that becomes due.
    pub fn advance(&self, step: Duration) {
        self.with_state(|s| {
            s.shift(step);
            s.chase();
        });
    }

    /// Advances the clock to the given absolute time.
    ///
    /// Moving backwards is supported for tests that simulate system clock changes;
    /// timers only ever fire when time moves forward.
    pub fn advance_to(&self, time: impl Into<SystemTime>) {
        let target = time.into();
        self.with_state(|s| {
            match target.duration_since(s.system_time) {
                Ok(step) => {
                    s.shift(step);
                    s.chase();
                }
                Err(err) => s.shift_back(err.duration()),
            };
        });
    }

    pub(crate) fn system_time(&self) -> SystemTime {
        self.with_state(ControlState::read_system_time)
    }

    pub(crate) fn instant(&self) -> Instant {
        self.with_state(ControlState::read_instant)
    }

    pub(crate) fn schedule_timer(&self, deadline: Instant, waker: Waker) -> TimerId {
        self.with_state(|s| {
            let id = s.queue.schedule(deadline, waker);
            s.chase();
            id
        })
    }

    pub(crate) fn cancel_timer(&self, id: TimerId) {
        self.with_state(|s| s.queue.cancel(id));
    }

    #[cfg(test)]
    pub(crate) fn timers_len(&self) -> usize {
        self.with_state(|s| s.queue.len())
    }

    fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ControlState) -> R,
    {
        f(&mut self.state.lock().expect("time control lock poisoned"))
    }
}

impl From<TimeControl> for Clock {
    fn from(control: TimeControl) -> Self {
        control.to_clock()
    }
}

impl From<&TimeControl> for Clock {
    fn from(control: &TimeControl) -> Self {
        control.to_clock()
    }
}

#[derive(Debug)]
struct ControlState {
    instant: Instant,
    system_time: SystemTime,
    queue: TimerQueue,
    auto_advance: Duration,
    auto_advance_cap: Option<Duration>,
    auto_advanced: Duration,
    chase_timers: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            instant: Instant::now(),
            system_time: SystemTime::UNIX_EPOCH,
            queue: TimerQueue::default(),
            auto_advance: Duration::ZERO,
            auto_advance_cap: None,
            auto_advanced: Duration::ZERO,
            chase_timers: false,
        }
    }
}

impl ControlState {
    /// Moves time forward and fires timers that became due.
    fn shift(&mut self, step: Duration) {
        if step.is_zero() {
            return;
        }

        self.instant = self.instant.checked_add(step).expect(OUT_OF_RANGE);
        self.system_time = self.system_time.checked_add(step).expect(OUT_OF_RANGE);
        self.queue.fire_due(self.instant);
    }

    /// Moves time backwards without touching timers.
    fn shift_back(&mut self, step: Duration) {
        if step.is_zero() {
            return;
        }

        self.instant = self.instant.checked_sub(step).expect(OUT_OF_RANGE);
        self.system_time = self.system_time.checked_sub(step).expect(OUT_OF_RANGE);
    }

    /// Jumps to pending timers, one at a time, while chasing is enabled and the
    /// auto-advance budget covers the full jump.
    ///
    /// A timer whose deadline lies beyond the remaining budget is left pending and
    /// consumes none of the budget; chasing only ever lands exactly on a deadline.
    /// The loop is iterative on purpose: firing a timer may register a follow-up
    /// timer (periodic ticks, retry backoff chains) that is then chased in turn.
    fn chase(&mut self) {
        if !self.chase_timers {
            return;
        }

        while let Some(next) = self.queue.next_deadline() {
            let gap = next.saturating_duration_since(self.instant);
            if gap.is_zero() {
                let _ = self.queue.fire_due(self.instant);
                continue;
            }
            if self.budgeted(gap) < gap {
                break;
            }

            self.auto_advanced = self.auto_advanced.saturating_add(gap);
            self.shift(gap);
        }
    }

    /// Limits an auto-advance step to the remaining budget.
    fn budgeted(&self, want: Duration) -> Duration {
        match self.auto_advance_cap {
            Some(cap) => want.min(cap.saturating_sub(self.auto_advanced)),
            None => want,
        }
    }

    fn read_system_time(&mut self) -> SystemTime {
        let time = self.system_time;
        self.apply_auto_advance();
        time
    }

    fn read_instant(&mut self) -> Instant {
        let instant = self.instant;
        self.apply_auto_advance();
        instant
    }

    fn apply_auto_advance(&mut self) {
        let step = self.budgeted(self.auto_advance);
        if step.is_zero() {
            return;
        }

        self.auto_advanced = self.auto_advanced.saturating_add(step);
        self.shift(step);
        self.chase();
    }
}

static OUT_OF_RANGE: &str = "moved the clock outside of the representable time range";

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(TimeControl: Send, Sync, Clone);

    #[test]
    fn defaults_start_at_epoch() {
        let control = TimeControl::new();

        assert_eq!(control.system_time(), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn advance_moves_both_time_axes() {
        let control = TimeControl::new();
        let clock = control.to_clock();

        let time = clock.system_time();
        let instant = clock.instant();

        control.advance(Duration::from_secs(1));

        assert_eq!(clock.system_time(), time + Duration::from_secs(1));
        assert_eq!(clock.instant().duration_since(instant), Duration::from_secs(1));
    }

    #[test]
    fn advance_millis_moves_time() {
        let control = TimeControl::new();
        let clock = control.to_clock();
        let before = clock.system_time();

        control.advance_millis(123);

        assert_eq!(clock.system_time(), before + Duration::from_millis(123));
    }

    #[test]
    fn advance_to_future_and_past() {
        let control = TimeControl::new();
        let clock = control.to_clock();

        let start = clock.system_time();
        control.advance_to(start + Duration::from_secs(10));
        assert_eq!(clock.system_time(), start + Duration::from_secs(10));

        control.advance_to(start + Duration::from_secs(5));
        assert_eq!(clock.system_time(), start + Duration::from_secs(5));
    }

    #[test]
    fn advance_fires_due_timers() {
        let control = TimeControl::new();
        let clock = control.to_clock();

        let _ = control.schedule_timer(clock.instant() + Duration::from_secs(1), Waker::noop().clone());
        assert_eq!(control.timers_len(), 1);

        control.advance(Duration::from_secs(1));
        assert_eq!(control.timers_len(), 0);
    }

    #[test]
    fn auto_advance_applies_per_read() {
        let step = Duration::from_secs(1);
        let control = TimeControl::new().auto_advance(step);
        let clock = control.to_clock();

        let first = clock.system_time();
        let second = clock.system_time();

        // The step is applied after the read; reads observe the previous position.
        assert_eq!(second.duration_since(first).expect("time moved forward"), step);
    }

    #[test]
    fn auto_advance_cap_limits_total() {
        let control = TimeControl::new()
            .auto_advance(Duration::from_millis(550))
            .auto_advance_cap(Duration::from_secs(1));
        let clock = control.to_clock();

        let anchor = clock.instant();

        let _ = clock.instant(); // +550ms
        let _ = clock.instant(); // +450ms, capped
        let _ = clock.instant(); // +0

        assert_eq!(clock.instant().duration_since(anchor), Duration::from_secs(1));
    }

    #[test]
    fn chase_fires_timer_on_registration() {
        let control = TimeControl::new().auto_advance_timers(true);
        let clock = control.to_clock();
        let start = clock.instant();

        let _ = control.schedule_timer(start + Duration::from_secs(100), Waker::noop().clone());

        assert_eq!(clock.instant().duration_since(start), Duration::from_secs(100));
        assert_eq!(control.timers_len(), 0);
    }

    #[test]
    fn chase_drains_timer_chains_iteratively() {
        let control = TimeControl::new().auto_advance_timers(true);
        let clock = control.to_clock();
        let start = clock.instant();

        for i in 1..=1000u64 {
            let _ = control.schedule_timer(start + Duration::from_millis(i), Waker::noop().clone());
        }

        assert_eq!(control.timers_len(), 0);
    }

    #[test]
    fn chase_respects_cap() {
        let control = TimeControl::new()
            .auto_advance_timers(true)
            .auto_advance_cap(Duration::from_secs(2));
        let clock = control.to_clock();
        let start = clock.instant();

        // Within budget: fires.
        let _ = control.schedule_timer(start + Duration::from_secs(1), Waker::noop().clone());
        assert_eq!(control.timers_len(), 0);

        // Beyond the remaining budget: stays pending and consumes no budget at all.
        let _ = control.schedule_timer(clock.instant() + Duration::from_secs(10), Waker::noop().clone());
        assert_eq!(control.timers_len(), 1);
        assert_eq!(clock.instant().duration_since(start), Duration::from_secs(1));
    }

    #[test]
    fn starting_at_sets_absolute_time() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(222);
        let clock = TimeControl::starting_at(start).to_clock();

        assert_eq!(clock.system_time(), start);
    }

    #[test]
    fn now_starts_at_current_time() {
        let before = SystemTime::now();
        let clock = TimeControl::now().to_clock();

        assert!(clock.system_time() >= before);
    }

    #[test]
    fn clones_share_state() {
        let control = TimeControl::new();
        let twin = control.clone();
        let clock = control.to_clock();

        twin.advance(Duration::from_secs(7));

        assert_eq!(clock.system_time(), SystemTime::UNIX_EPOCH + Duration::from_secs(7));
    }
}
