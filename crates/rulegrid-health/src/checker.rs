//! Per-instance probe-result tracking.
//!
//! Probing itself is platform-specific and lives on the runtime backend;
//! the tracker turns a sequence of [`ProbeResult`]s into consecutive
//! success/failure counts and an exponential backoff between background
//! checks. Persisted health always follows the latest probe directly; the
//! tracker only paces the sweep and flags state transitions for logging.

use std::time::Duration;

use tracing::{debug, warn};

use rulegrid_backend::ProbeResult;
use rulegrid_core::HealthState;

/// Tracks consecutive probe results for a single instance.
#[derive(Debug)]
pub struct HealthTracker {
    state: HealthState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    unhealthy_threshold: u32,
    healthy_threshold: u32,
    current_backoff: Duration,
    base_interval: Duration,
    max_backoff: Duration,
}

impl HealthTracker {
    /// Tracker with the standard schedule: three failures to go unhealthy,
    /// one success to recover, backoff doubling up to a minute.
    pub fn new(base_interval: Duration) -> Self {
        Self::with_thresholds(3, 1, base_interval)
    }

    pub fn with_thresholds(
        unhealthy_threshold: u32,
        healthy_threshold: u32,
        base_interval: Duration,
    ) -> Self {
        Self {
            state: HealthState::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            unhealthy_threshold,
            healthy_threshold,
            current_backoff: base_interval,
            base_interval,
            max_backoff: Duration::from_secs(60),
        }
    }

    /// Record a probe result and return the tracker's smoothed state.
    pub fn record(&mut self, result: &ProbeResult) -> HealthState {
        match result {
            ProbeResult::Healthy => {
                self.consecutive_failures = 0;
                self.consecutive_successes += 1;
                self.current_backoff = self.base_interval;

                if self.consecutive_successes >= self.healthy_threshold {
                    if self.state != HealthState::Healthy {
                        debug!(
                            successes = self.consecutive_successes,
                            "instance recovered to healthy"
                        );
                    }
                    self.state = HealthState::Healthy;
                }
            }
            ProbeResult::Unhealthy { .. } | ProbeResult::Failed { .. } => {
                self.consecutive_successes = 0;
                self.consecutive_failures += 1;
                self.current_backoff = (self.current_backoff * 2).min(self.max_backoff);

                if self.consecutive_failures >= self.unhealthy_threshold {
                    if self.state != HealthState::Unhealthy {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.unhealthy_threshold,
                            "instance marked unhealthy"
                        );
                    }
                    self.state = HealthState::Unhealthy;
                }
            }
        }
        self.state
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Interval to wait before the next background probe of this instance.
    pub fn next_interval(&self) -> Duration {
        self.current_backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> ProbeResult {
        ProbeResult::Failed {
            reason: "connect refused".into(),
        }
    }

    #[test]
    fn tracker_starts_unknown() {
        let tracker = HealthTracker::new(Duration::from_secs(5));
        assert_eq!(tracker.state(), HealthState::Unknown);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn tracker_becomes_healthy_on_first_success() {
        let mut tracker = HealthTracker::new(Duration::from_secs(5));
        assert_eq!(tracker.record(&ProbeResult::Healthy), HealthState::Healthy);
    }

    #[test]
    fn tracker_stays_healthy_under_threshold() {
        let mut tracker = HealthTracker::new(Duration::from_secs(5));
        tracker.record(&ProbeResult::Healthy);
        tracker.record(&ProbeResult::Unhealthy { reason: "HTTP 503".into() });
        tracker.record(&ProbeResult::Unhealthy { reason: "HTTP 503".into() });
        assert_eq!(tracker.state(), HealthState::Healthy);
        assert_eq!(tracker.consecutive_failures(), 2);
    }

    #[test]
    fn tracker_becomes_unhealthy_at_threshold() {
        let mut tracker = HealthTracker::new(Duration::from_secs(5));
        tracker.record(&ProbeResult::Healthy);
        for _ in 0..3 {
            tracker.record(&failed());
        }
        assert_eq!(tracker.state(), HealthState::Unhealthy);
    }

    #[test]
    fn tracker_recovers_on_single_success() {
        let mut tracker = HealthTracker::new(Duration::from_secs(5));
        for _ in 0..3 {
            tracker.record(&ProbeResult::Unhealthy { reason: "HTTP 500".into() });
        }
        assert_eq!(tracker.state(), HealthState::Unhealthy);
        assert_eq!(tracker.record(&ProbeResult::Healthy), HealthState::Healthy);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut tracker = HealthTracker::with_thresholds(100, 1, Duration::from_secs(1));
        assert_eq!(tracker.next_interval(), Duration::from_secs(1));
        tracker.record(&failed());
        assert_eq!(tracker.next_interval(), Duration::from_secs(2));
        for _ in 0..10 {
            tracker.record(&failed());
        }
        assert_eq!(tracker.next_interval(), Duration::from_secs(60));
    }

    #[test]
    fn backoff_resets_on_success() {
        let mut tracker = HealthTracker::with_thresholds(5, 1, Duration::from_secs(1));
        tracker.record(&failed());
        tracker.record(&failed());
        assert_eq!(tracker.next_interval(), Duration::from_secs(4));
        tracker.record(&ProbeResult::Healthy);
        assert_eq!(tracker.next_interval(), Duration::from_secs(1));
    }
}
