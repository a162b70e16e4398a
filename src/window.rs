use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{QEstimateError, Result};
use crate::estimator::Estimator;
use crate::invariant::{parse_invariants, Invariant};

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_AGE_BUCKETS: usize = 5;

/// Source of the current time in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall clock time since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test or a replay loop can keep a handle
/// while the estimator owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Quantile estimates over a sliding window of time.
///
/// Keeps a ring of `age_buckets` estimators. Every observation goes into all of
/// them, and every `max_age / age_buckets` the oldest bucket is replaced with a
/// fresh one. Queries read the bucket that has been collecting the longest, so
/// estimates cover at most `max_age` worth of observations.
///
/// Also tracks the running count and sum of all observations, as a summary
/// metric would.
#[derive(Debug)]
pub struct TimeWindowEstimator<C: Clock = SystemClock> {
    invariants: Vec<Invariant>,
    max_age: Duration,
    buckets: Vec<Estimator>,
    current: usize,
    last_rotate_ms: u64,
    rotate_interval_ms: u64,
    count: u64,
    sum: f64,
    clock: C,
}

impl TimeWindowEstimator<SystemClock> {
    /// Creates a window estimator driven by the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant is out of range, `age_buckets` is zero,
    /// or `max_age` is shorter than one millisecond per bucket.
    pub fn new(invariants: &[(f64, f64)], max_age: Duration, age_buckets: usize) -> Result<Self> {
        Self::with_clock(invariants, max_age, age_buckets, SystemClock)
    }
}

impl<C: Clock> TimeWindowEstimator<C> {
    /// Creates a window estimator driven by `clock`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`TimeWindowEstimator::new`].
    pub fn with_clock(
        invariants: &[(f64, f64)],
        max_age: Duration,
        age_buckets: usize,
        clock: C,
    ) -> Result<Self> {
        if age_buckets == 0 {
            return Err(QEstimateError::InvalidWindow(
                "at least one age bucket is required".to_string(),
            ));
        }

        let rotate_interval_ms = u64::try_from(max_age.as_millis() / age_buckets as u128)
            .map_err(|_| QEstimateError::InvalidWindow(format!("max age {max_age:?} is too long")))?;
        if rotate_interval_ms == 0 {
            return Err(QEstimateError::InvalidWindow(format!(
                "max age {max_age:?} is too short for {age_buckets} buckets"
            )));
        }

        let invariants = parse_invariants(invariants)?;
        let buckets = (0..age_buckets)
            .map(|_| Estimator::with_invariants(invariants.clone()))
            .collect();
        let last_rotate_ms = clock.now_ms();

        debug!(
            "Created time window of {:?} with {} buckets rotating every {}ms",
            max_age, age_buckets, rotate_interval_ms
        );

        Ok(Self {
            invariants,
            max_age,
            buckets,
            current: 0,
            last_rotate_ms,
            rotate_interval_ms,
            count: 0,
            sum: 0.0,
            clock,
        })
    }

    pub fn invariants(&self) -> &[Invariant] {
        &self.invariants
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn age_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Total number of observations since creation, regardless of age.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of all observations since creation, regardless of age.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Samples an observation into every bucket. Non-finite values are ignored.
    pub fn observe(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }

        self.rotate();
        for bucket in &mut self.buckets {
            bucket.observe(value);
        }

        self.count += 1;
        self.sum += value;
    }

    /// Estimates the value at quantile `rank` over the current window.
    pub fn query(&mut self, rank: f64) -> Option<f64> {
        self.rotate();
        self.buckets[self.current].query(rank)
    }

    /// Replaces expired buckets and advances the ring to the current time.
    fn rotate(&mut self) {
        let elapsed = self.clock.now_ms().saturating_sub(self.last_rotate_ms);
        if elapsed <= self.rotate_interval_ms {
            return;
        }

        // Number of whole intervals strictly exceeded since the last rotation.
        let steps = (elapsed - 1) / self.rotate_interval_ms;
        let len = self.buckets.len();

        #[allow(clippy::cast_possible_truncation)]
        let resets = steps.min(len as u64) as usize;
        for offset in 0..resets {
            let index = (self.current + offset) % len;
            self.buckets[index] = Estimator::with_invariants(self.invariants.clone());
        }

        #[allow(clippy::cast_possible_truncation)]
        let advance = (steps % len as u64) as usize;
        self.current = (self.current + advance) % len;
        self.last_rotate_ms += steps * self.rotate_interval_ms;

        debug!(
            "Rotated time window by {} intervals, {} buckets reset",
            steps, resets
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(clock: &ManualClock) -> TimeWindowEstimator<ManualClock> {
        TimeWindowEstimator::with_clock(&[(0.5, 0.01)], Duration::from_secs(5), 5, clock.clone())
            .unwrap()
    }

    #[test]
    fn test_rejects_zero_buckets() {
        let result = TimeWindowEstimator::new(&[], DEFAULT_MAX_AGE, 0);
        assert!(matches!(result, Err(QEstimateError::InvalidWindow(_))));
    }

    #[test]
    fn test_rejects_too_short_max_age() {
        let result = TimeWindowEstimator::new(&[], Duration::from_millis(3), 5);
        assert!(matches!(result, Err(QEstimateError::InvalidWindow(_))));
    }

    #[test]
    fn test_rejects_invalid_invariants() {
        let result = TimeWindowEstimator::new(&[(2.0, 0.1)], DEFAULT_MAX_AGE, 5);
        assert!(matches!(
            result,
            Err(QEstimateError::InvalidInvariant { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        let estimator = TimeWindowEstimator::new(&[], DEFAULT_MAX_AGE, DEFAULT_AGE_BUCKETS).unwrap();
        assert_eq!(estimator.age_buckets(), 5);
        assert_eq!(estimator.max_age(), Duration::from_secs(600));
        assert_eq!(estimator.invariants().len(), 2);
    }

    #[test]
    fn test_observations_within_window_are_visible() {
        let clock = ManualClock::new(0);
        let mut estimator = window(&clock);

        for value in 1..=9 {
            estimator.observe(f64::from(value));
        }
        clock.advance(Duration::from_millis(900));

        assert_eq!(estimator.query(0.5), Some(5.0));
    }

    #[test]
    fn test_observation_survives_first_rotation() {
        let clock = ManualClock::new(0);
        let mut estimator = window(&clock);

        estimator.observe(10.0);
        clock.advance(Duration::from_millis(1001));

        assert_eq!(estimator.query(0.5), Some(10.0));
    }

    #[test]
    fn test_observation_expires_after_max_age() {
        let clock = ManualClock::new(0);
        let mut estimator = window(&clock);

        estimator.observe(10.0);
        clock.advance(Duration::from_millis(1001));
        assert_eq!(estimator.query(0.5), Some(10.0));

        clock.advance(Duration::from_millis(4000));
        assert_eq!(estimator.query(0.5), None);
    }

    #[test]
    fn test_only_recent_observations_remain() {
        let clock = ManualClock::new(0);
        let mut estimator = window(&clock);

        estimator.observe(1.0);
        clock.set(2500);
        estimator.observe(2.0);
        clock.set(5500);

        assert_eq!(estimator.query(0.0), Some(2.0));
        assert_eq!(estimator.query(1.0), Some(2.0));
    }

    #[test]
    fn test_long_idle_period_resets_everything() {
        let clock = ManualClock::new(1_000);
        let mut estimator = window(&clock);

        estimator.observe(3.0);
        clock.advance(Duration::from_secs(24 * 60 * 60));

        assert_eq!(estimator.query(0.5), None);
        estimator.observe(4.0);
        assert_eq!(estimator.query(0.5), Some(4.0));
    }

    #[test]
    fn test_clock_going_backwards_does_not_rotate() {
        let clock = ManualClock::new(10_000);
        let mut estimator = window(&clock);

        estimator.observe(7.0);
        clock.set(0);

        assert_eq!(estimator.query(0.5), Some(7.0));
    }

    #[test]
    fn test_count_and_sum_ignore_window() {
        let clock = ManualClock::new(0);
        let mut estimator = window(&clock);

        estimator.observe(1.5);
        estimator.observe(2.5);
        estimator.observe(f64::NAN);
        clock.advance(Duration::from_secs(60));
        estimator.observe(4.0);

        assert_eq!(estimator.count(), 3);
        assert!((estimator.sum() - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now_ms() > 0);
    }
}
