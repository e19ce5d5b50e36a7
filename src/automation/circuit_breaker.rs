//! Circuit Breaker
//! ===============
//! Failure-counting gate in front of each actuator family. Open breakers
//! short-circuit dispatches until the cooldown elapses, then admit exactly
//! one probe in half-open state.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::metrics::CIRCUIT_BREAKERS_OPEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    /// A probe has been admitted in half-open and has not reported back yet.
    probe_in_flight: bool,
}

/// Snapshot of breaker state for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a dispatch may proceed. In open state the cooldown gates
    /// the transition to half-open, which admits a single probe.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled_down = inner
                    .last_failure_at
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    CIRCUIT_BREAKERS_OPEN.dec();
                    info!(breaker = %self.name, "circuit breaker half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Report a successful dispatch.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            info!(breaker = %self.name, "probe succeeded, closing circuit");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.probe_in_flight = false;
    }

    /// Report a failed dispatch. Consecutive failures at the threshold
    /// open the circuit; a failed half-open probe re-opens it.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_at = Some(Instant::now());
        let reopened = inner.state == BreakerState::HalfOpen;
        if reopened || inner.failure_count >= self.failure_threshold {
            if inner.state != BreakerState::Open {
                CIRCUIT_BREAKERS_OPEN.inc();
                warn!(
                    breaker = %self.name,
                    failures = inner.failure_count,
                    "circuit breaker opened"
                );
            }
            inner.state = BreakerState::Open;
        }
        inner.probe_in_flight = false;
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock();
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.failure_threshold,
            cooldown_secs: self.cooldown.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new("test", threshold, Duration::from_millis(cooldown_ms))
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(3, 60_000);
        for _ in 0..2 {
            assert!(cb.allow());
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.allow());
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let cb = breaker(3, 60_000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let cb = breaker(1, 10);
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow());

        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow(), "cooldown elapsed, probe admitted");
        assert!(!cb.allow(), "only one probe while half-open");

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.allow());
    }

    #[test]
    fn test_failed_probe_reopens() {
        let cb = breaker(1, 10);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow());
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow());
    }
}
