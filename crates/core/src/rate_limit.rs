//! Sliding-window throttle for record-creating operations.
//!
//! A create is admitted while fewer than `max_per_window` creates completed in the
//! trailing window. Admission hands out a [`CreatePermit`] that holds a slot until
//! the guarded call finishes: committing records the completion timestamp,
//! dropping releases the slot without counting it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_per_window: usize,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self { max_per_window: 5, window: Duration::seconds(60) }
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error(
    "Rate limit reached: {max} records created in the last {window_secs} seconds. \
     Wait a moment before creating more."
)]
pub struct RateLimited {
    pub max: usize,
    pub window_secs: i64,
}

/// Completion timestamps of prior creates, oldest first.
#[derive(Clone, Debug, Default)]
pub struct RateWindow {
    timestamps: VecDeque<DateTime<Utc>>,
}

impl RateWindow {
    /// Number of entries strictly newer than `now - window`.
    pub fn active_count(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = now - window;
        self.timestamps.iter().filter(|&&at| at > cutoff).count()
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        self.timestamps.push_back(at);
    }

    /// Drops expired entries. Only bounds memory; counting never relies on it.
    fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        let cutoff = now - window;
        while self.timestamps.front().is_some_and(|&at| at <= cutoff) {
            self.timestamps.pop_front();
        }
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    window: RateWindow,
    reserved: usize,
}

pub struct RateLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock, state: Mutex::new(LimiterState::default()) }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Reserves a slot for one create, or reports the quota as exhausted.
    ///
    /// In-flight reservations count against the quota so concurrent callers can
    /// never push completions past `max_per_window`.
    pub fn try_acquire(&self) -> Result<CreatePermit<'_>, RateLimited> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.window.prune(now, self.policy.window);

        let in_use = state.window.active_count(now, self.policy.window) + state.reserved;
        if in_use >= self.policy.max_per_window {
            return Err(RateLimited {
                max: self.policy.max_per_window,
                window_secs: self.policy.window.num_seconds(),
            });
        }

        state.reserved += 1;
        Ok(CreatePermit { limiter: self, settled: false })
    }

    pub fn remaining(&self) -> usize {
        let now = self.clock.now();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let in_use = state.window.active_count(now, self.policy.window) + state.reserved;
        self.policy.max_per_window.saturating_sub(in_use)
    }

    fn settle(&self, completed: bool) {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.reserved = state.reserved.saturating_sub(1);
        if completed {
            state.window.record(now);
        }
    }
}

/// A reserved create slot. Call [`CreatePermit::commit`] once the create succeeded.
#[must_use = "dropping a permit releases the slot without recording the create"]
pub struct CreatePermit<'a> {
    limiter: &'a RateLimiter,
    settled: bool,
}

impl CreatePermit<'_> {
    pub fn commit(mut self) {
        self.settled = true;
        self.limiter.settle(true);
    }
}

impl Drop for CreatePermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.limiter.settle(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{Clock, RateLimitPolicy, RateLimited, RateLimiter, RateWindow};

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn starting_at(at: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(at)))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().expect("clock lock");
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().expect("clock lock")
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid timestamp")
    }

    #[test]
    fn five_creates_admitted_sixth_rejected() {
        let clock = ManualClock::starting_at(start());
        let limiter = RateLimiter::with_clock(RateLimitPolicy::default(), clock.clone());

        for _ in 0..5 {
            limiter.try_acquire().expect("within quota").commit();
            clock.advance(Duration::seconds(1));
        }

        let rejected = limiter.try_acquire().err();
        assert_eq!(rejected, Some(RateLimited { max: 5, window_secs: 60 }));
        assert_eq!(
            rejected.map(|error| error.to_string()).unwrap_or_default(),
            "Rate limit reached: 5 records created in the last 60 seconds. \
             Wait a moment before creating more."
        );
    }

    #[test]
    fn oldest_entry_expiring_restores_exactly_one_slot() {
        let clock = ManualClock::starting_at(start());
        let limiter = RateLimiter::with_clock(RateLimitPolicy::default(), clock.clone());

        for _ in 0..5 {
            limiter.try_acquire().expect("within quota").commit();
            clock.advance(Duration::seconds(10));
        }
        // First create at t=0, now t=50.
        assert!(limiter.try_acquire().is_err());

        // t=60: the t=0 entry is exactly one window old and no longer counts.
        clock.advance(Duration::seconds(10));
        assert_eq!(limiter.remaining(), 1);
        limiter.try_acquire().expect("one slot restored").commit();
        assert!(limiter.try_acquire().is_err());
    }

    #[test]
    fn dropped_permit_releases_slot_without_counting() {
        let clock = ManualClock::starting_at(start());
        let policy = RateLimitPolicy { max_per_window: 1, window: Duration::seconds(60) };
        let limiter = RateLimiter::with_clock(policy, clock);

        {
            let _permit = limiter.try_acquire().expect("first slot");
            assert!(limiter.try_acquire().is_err(), "in-flight create holds the slot");
        }

        assert_eq!(limiter.remaining(), 1);
        limiter.try_acquire().expect("slot released").commit();
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn window_counts_only_entries_inside_trailing_duration() {
        let policy = RateLimitPolicy::default();
        let mut window = RateWindow::default();
        let now = start();

        window.record(now - Duration::seconds(120));
        window.record(now - Duration::seconds(60));
        window.record(now - Duration::seconds(59));
        assert_eq!(window.active_count(now, policy.window), 1);

        for _ in 0..4 {
            window.record(now);
        }
        assert_eq!(window.active_count(now, policy.window), policy.max_per_window);
    }
}
