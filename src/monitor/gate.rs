//! Consecutive-failure gate.
//!
//! Decides whether a failed refresh is reported or hidden behind the last
//! good result. A single blip is masked when there is something to show;
//! repeated failures, or any failure before the first success, surface.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Failures tolerated before surfacing when prior data exists.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;

/// Counts consecutive failures against a threshold.
#[derive(Debug)]
pub struct FailureGate {
    threshold: u32,
    consecutive_failures: Mutex<u32>,
}

impl Default for FailureGate {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl FailureGate {
    /// Create a gate that surfaces on the `threshold`-th consecutive failure.
    ///
    /// A threshold of zero behaves like one.
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive_failures: Mutex::new(0),
        }
    }

    /// The configured threshold.
    #[must_use]
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record a failure and decide whether to surface it.
    ///
    /// Without prior data there is nothing to fall back on, so the failure
    /// always surfaces. Otherwise it surfaces once the counter reaches the
    /// threshold.
    pub fn should_surface(&self, had_prior_data: bool) -> bool {
        let mut failures = self.lock();
        *failures = failures.saturating_add(1);
        let surface = !had_prior_data || *failures >= self.threshold;
        if !surface {
            tracing::debug!(
                consecutive_failures = *failures,
                threshold = self.threshold,
                "masking refresh failure behind cached data"
            );
        }
        surface
    }

    /// Record a success, clearing the counter.
    pub fn record_success(&self) {
        *self.lock() = 0;
    }

    /// Clear the counter without a success, e.g. after switching connection.
    pub fn reset(&self) {
        *self.lock() = 0;
    }

    /// Current number of consecutive failures.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        self.consecutive_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::FailureGate;

    #[fixture]
    fn gate() -> FailureGate {
        FailureGate::default()
    }

    #[rstest]
    fn first_failure_with_prior_data_is_masked(gate: FailureGate) {
        assert!(!gate.should_surface(true));
        assert_eq!(gate.consecutive_failures(), 1);
    }

    #[rstest]
    fn second_failure_with_prior_data_surfaces(gate: FailureGate) {
        assert!(!gate.should_surface(true));
        assert!(gate.should_surface(true));
        assert!(gate.should_surface(true));
        assert_eq!(gate.consecutive_failures(), 3);
    }

    #[rstest]
    fn failure_without_prior_data_always_surfaces(gate: FailureGate) {
        assert!(gate.should_surface(false));
    }

    #[rstest]
    fn success_restarts_the_count(gate: FailureGate) {
        assert!(!gate.should_surface(true));
        gate.record_success();

        assert_eq!(gate.consecutive_failures(), 0);
        assert!(!gate.should_surface(true));
    }

    #[rstest]
    fn reset_clears_the_count(gate: FailureGate) {
        assert!(!gate.should_surface(true));
        assert!(gate.should_surface(true));
        gate.reset();

        assert_eq!(gate.consecutive_failures(), 0);
    }

    #[rstest]
    #[case::threshold_one(1, 0)]
    #[case::threshold_two(2, 1)]
    #[case::threshold_four(4, 3)]
    fn failures_below_threshold_are_masked(#[case] threshold: u32, #[case] masked: u32) {
        let gate = FailureGate::new(threshold);

        for _ in 0..masked {
            assert!(!gate.should_surface(true));
        }
        assert!(gate.should_surface(true));
    }

    #[rstest]
    fn zero_threshold_surfaces_immediately() {
        assert!(FailureGate::new(0).should_surface(true));
    }
}
