//! Saturation-aware circuit breaker (§4.4). Holds process-wide mutable
//! counters behind a short mutual-exclusion section; reads outside the
//! section are tolerated as eventually consistent, the same trade-off the
//! internal-transfer coordinator's CAS-guarded state makes for its FSM.

use crate::config::{BreakerSettings, RetryAfterSettings};
use crate::pool_monitor::PoolSnapshot;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    opened_at: Instant,
    recovery_interval: Duration,
    consecutive_util_breaches: u32,
    recent_failures: u32,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    settings: BreakerSettings,
    retry_after: RetryAfterSettings,
    inner: Mutex<Inner>,
}

/// Outcome of an admission check: either the breaker lets the batch proceed,
/// or it rejects with a retry-after hint (§4.4's "overload, not client fault"
/// rule — this never maps to a 4xx).
pub enum Admission {
    Admit,
    Reject { retry_after_secs: u64 },
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings, retry_after: RetryAfterSettings) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                opened_at: Instant::now(),
                recovery_interval: Duration::from_millis(settings.open_duration_ms),
                consecutive_util_breaches: 0,
                recent_failures: 0,
                probe_in_flight: false,
            }),
            settings,
            retry_after,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Consulted by the orchestrator before touching the database or
    /// downstream (§4.6 step 1). Open → Half-Open transition happens here
    /// once the recovery interval has elapsed.
    pub fn admit(&self, latest_pool: PoolSnapshot) -> Admission {
        if !self.settings.enabled {
            return Admission::Admit;
        }

        let mut guard = self.inner.lock().unwrap();
        match guard.state {
            BreakerState::Closed => Admission::Admit,
            BreakerState::Open => {
                if guard.opened_at.elapsed() >= guard.recovery_interval {
                    guard.state = BreakerState::HalfOpen;
                    guard.probe_in_flight = true;
                    Admission::Admit
                } else {
                    Admission::Reject {
                        retry_after_secs: self.retry_after(latest_pool),
                    }
                }
            }
            BreakerState::HalfOpen => {
                if guard.probe_in_flight {
                    Admission::Reject {
                        retry_after_secs: self.retry_after(latest_pool),
                    }
                } else {
                    guard.probe_in_flight = true;
                    Admission::Admit
                }
            }
        }
    }

    /// Feeds a pool-utilization sample. Trips Closed → Open when utilization
    /// stays at or above the threshold for `consecutive-samples` in a row.
    pub fn observe_pool_sample(&self, snapshot: PoolSnapshot) {
        let mut guard = self.inner.lock().unwrap();
        if guard.state != BreakerState::Closed {
            return;
        }
        if snapshot.utilization >= self.settings.util_threshold {
            guard.consecutive_util_breaches += 1;
            if guard.consecutive_util_breaches >= self.settings.consecutive_samples {
                Self::trip_open(&mut guard, self.settings.open_duration_ms);
            }
        } else {
            guard.consecutive_util_breaches = 0;
        }
    }

    /// Records a bulk-submission outcome. A probe success in Half-Open
    /// closes the breaker; a probe failure reopens with a longer interval.
    pub fn record_success(&self) {
        let mut guard = self.inner.lock().unwrap();
        match guard.state {
            BreakerState::HalfOpen => {
                guard.state = BreakerState::Closed;
                guard.probe_in_flight = false;
                guard.recent_failures = 0;
                guard.consecutive_util_breaches = 0;
            }
            BreakerState::Closed => {
                guard.recent_failures = guard.recent_failures.saturating_sub(1);
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut guard = self.inner.lock().unwrap();
        match guard.state {
            BreakerState::HalfOpen => {
                let longer = self.settings.open_duration_ms.saturating_mul(2);
                Self::trip_open(&mut guard, longer);
            }
            BreakerState::Closed => {
                guard.recent_failures += 1;
                if guard.recent_failures >= self.settings.failure_threshold {
                    Self::trip_open(&mut guard, self.settings.open_duration_ms);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn trip_open(guard: &mut Inner, recovery_ms: u64) {
        guard.state = BreakerState::Open;
        guard.opened_at = Instant::now();
        guard.recovery_interval = Duration::from_millis(recovery_ms);
        guard.probe_in_flight = false;
        guard.recent_failures = 0;
        guard.consecutive_util_breaches = 0;
    }

    /// Base delay scaled by the worst observed resource utilization, capped
    /// per §4.4 ("base delay scaled by max resource utilization ... capped"),
    /// using the configured `retryAfter.base-seconds`/`retryAfter.max-seconds`
    /// (§6) so an operator who tunes those gets a consistent hint regardless
    /// of which overload path rejected the batch.
    fn retry_after(&self, latest_pool: PoolSnapshot) -> u64 {
        retry_after_seconds(
            latest_pool.utilization,
            self.retry_after.base_seconds,
            self.retry_after.max_seconds,
        )
    }
}

/// Pure helper so the scaling formula is independently testable: base delay
/// scaled by max utilization, capped at `max_seconds`, floored at `base`.
pub fn retry_after_seconds(max_utilization: f64, base_seconds: u64, max_seconds: u64) -> u64 {
    let scaled = (base_seconds as f64) * (1.0 + max_utilization);
    (scaled.round() as u64).clamp(base_seconds, max_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BreakerSettings {
        BreakerSettings {
            enabled: true,
            util_threshold: 0.9,
            consecutive_samples: 2,
            failure_threshold: 3,
            open_duration_ms: 15_000,
        }
    }

    fn retry_after_settings() -> RetryAfterSettings {
        RetryAfterSettings {
            base_seconds: 60,
            max_seconds: 300,
        }
    }

    fn new_breaker(settings: BreakerSettings) -> CircuitBreaker {
        CircuitBreaker::new(settings, retry_after_settings())
    }

    fn snapshot(utilization: f64, waiting: usize) -> PoolSnapshot {
        PoolSnapshot {
            active: 18,
            idle: 2,
            waiting,
            total: 20,
            utilization,
        }
    }

    #[test]
    fn closed_by_default_admits() {
        let breaker = new_breaker(settings());
        assert!(matches!(
            breaker.admit(snapshot(0.1, 0)),
            Admission::Admit
        ));
    }

    #[test]
    fn trips_open_after_consecutive_util_breaches() {
        let breaker = new_breaker(settings());
        breaker.observe_pool_sample(snapshot(0.95, 0));
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.observe_pool_sample(snapshot(0.95, 0));
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn single_low_sample_resets_consecutive_count() {
        let breaker = new_breaker(settings());
        breaker.observe_pool_sample(snapshot(0.95, 0));
        breaker.observe_pool_sample(snapshot(0.2, 0));
        breaker.observe_pool_sample(snapshot(0.95, 0));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn trips_open_after_failure_threshold() {
        let breaker = new_breaker(settings());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn open_rejects_until_recovery_interval_elapses() {
        let mut custom = settings();
        custom.open_duration_ms = 20;
        let breaker = new_breaker(custom);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_failure();
        assert!(matches!(
            breaker.admit(snapshot(0.5, 0)),
            Admission::Reject { .. }
        ));
        std::thread::sleep(Duration::from_millis(30));
        assert!(matches!(breaker.admit(snapshot(0.5, 0)), Admission::Admit));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_probe_success_closes_breaker() {
        let mut custom = settings();
        custom.open_duration_ms = 10;
        let breaker = new_breaker(custom);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        let _ = breaker.admit(snapshot(0.2, 0));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens_with_longer_interval() {
        let mut custom = settings();
        custom.open_duration_ms = 10;
        let breaker = new_breaker(custom);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        let _ = breaker.admit(snapshot(0.2, 0));
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        let interval = breaker.inner.lock().unwrap().recovery_interval;
        assert!(interval >= Duration::from_millis(20));
    }

    #[test]
    fn retry_after_is_bounded_by_range() {
        assert_eq!(retry_after_seconds(0.0, 60, 300), 60);
        assert_eq!(retry_after_seconds(1.0, 60, 300), 120);
        assert_eq!(retry_after_seconds(10.0, 60, 300), 300);
    }

    #[test]
    fn reject_retry_after_honors_configured_bounds() {
        let mut custom = settings();
        custom.open_duration_ms = 20;
        let breaker = CircuitBreaker::new(
            custom,
            RetryAfterSettings {
                base_seconds: 10,
                max_seconds: 50,
            },
        );
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_failure();
        match breaker.admit(snapshot(10.0, 0)) {
            Admission::Reject { retry_after_secs } => {
                assert!((10..=50).contains(&retry_after_secs));
                assert_eq!(retry_after_secs, 50);
            }
            Admission::Admit => panic!("expected rejection while breaker is open"),
        }
    }
}
