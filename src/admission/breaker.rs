use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::warn;

use super::JobKey;

#[derive(Debug, Clone, Copy)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_failure: Instant,
}

/// Opens for a `(notify target, collection)` pair after repeated failed jobs
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    states: DashMap<JobKey, BreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            states: DashMap::new(),
        }
    }

    /// `Err(remaining cooldown)` while open
    pub fn check_at(&self, key: &JobKey, now: Instant) -> Result<(), Duration> {
        let Some(state) = self.states.get(key) else {
            return Ok(());
        };

        match state.opened_at {
            Some(opened) => {
                let until = opened + self.cooldown;
                if now < until { Err(until - now) } else { Ok(()) }
            }
            None => Ok(()),
        }
    }

    pub fn record_success(&self, key: &JobKey) {
        self.states.remove(key);
    }

    pub fn record_failure_at(&self, key: &JobKey, now: Instant) {
        let mut state = self.states.entry(key.clone()).or_insert(BreakerState {
            consecutive_failures: 0,
            opened_at: None,
            last_failure: now,
        });
        state.consecutive_failures += 1;
        state.last_failure = now;

        if state.consecutive_failures >= self.threshold {
            state.opened_at = Some(now);
            warn!(
                notify_target = %key.notify_target,
                collection_id = %key.collection_id,
                failures = state.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit opened"
            );
        }
    }

    /// Forget pairs whose last failure is older than the cooldown
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.states.len();
        self.states
            .retain(|_, state| now.saturating_duration_since(state.last_failure) < self.cooldown);
        before.saturating_sub(self.states.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }
}
