//! Admission Guard
//!
//! Protects the pipeline from resubmission storms. A submission passes
//! three gates, cheapest state change last:
//!
//! 1. the per-collection circuit breaker (`circuit_open`)
//! 2. in-flight de-duplication (`already_running`)
//! 3. the sliding-window rate limit (`too_many_requests`)
//!
//! All state is local to this process. Several instances behind a load
//! balancer each enforce their own limits.

mod breaker;
mod limiter;

pub use breaker::CircuitBreaker;
pub use limiter::RateLimiter;

use dashmap::DashSet;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::AdmissionConfig;

/// Rate-limit key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdmissionKey {
    pub notify_target: String,
    pub client_address: String,
}

impl AdmissionKey {
    pub fn new(notify_target: &str, client_address: &str) -> Self {
        Self {
            notify_target: normalize(notify_target),
            client_address: client_address.trim().to_string(),
        }
    }
}

/// Breaker and de-duplication key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub notify_target: String,
    pub collection_id: String,
}

impl JobKey {
    pub fn new(notify_target: &str, collection_id: &str) -> Self {
        Self {
            notify_target: normalize(notify_target),
            collection_id: collection_id.trim().to_string(),
        }
    }
}

fn normalize(target: &str) -> String {
    target.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooManyRequests,
    CircuitOpen,
    AlreadyRunning,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TooManyRequests => "too_many_requests",
            RejectReason::CircuitOpen => "circuit_open",
            RejectReason::AlreadyRunning => "already_running",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub retry_after: Option<Duration>,
}

impl Rejection {
    /// Human-readable explanation for API responses
    pub fn message(&self) -> String {
        let base = match self.reason {
            RejectReason::TooManyRequests => "too many requests for this recipient",
            RejectReason::CircuitOpen => "this collection failed repeatedly; resubmission paused",
            RejectReason::AlreadyRunning => "an archive for this collection is already being built",
        };
        match self.retry_after {
            Some(wait) => format!("{base}; retry in {}s", wait.as_secs().max(1)),
            None => base.to_string(),
        }
    }
}

#[derive(Debug)]
struct GuardState {
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    in_flight: DashSet<JobKey>,
}

/// Shared, cloneable front gate for job submissions
#[derive(Debug, Clone)]
pub struct AdmissionGuard {
    state: Arc<GuardState>,
}

impl AdmissionGuard {
    pub fn new(limiter: RateLimiter, breaker: CircuitBreaker) -> Self {
        Self {
            state: Arc::new(GuardState {
                limiter,
                breaker,
                in_flight: DashSet::new(),
            }),
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(
            RateLimiter::new(config.window(), config.max_requests),
            CircuitBreaker::new(config.breaker_failure_threshold, config.breaker_cooldown()),
        )
    }

    pub fn admit(
        &self,
        notify_target: &str,
        collection_id: &str,
        client_address: &str,
    ) -> Result<AdmissionPermit, Rejection> {
        self.admit_at(notify_target, collection_id, client_address, Instant::now())
    }

    pub fn admit_at(
        &self,
        notify_target: &str,
        collection_id: &str,
        client_address: &str,
        now: Instant,
    ) -> Result<AdmissionPermit, Rejection> {
        let job_key = JobKey::new(notify_target, collection_id);

        if let Err(remaining) = self.state.breaker.check_at(&job_key, now) {
            return Err(self.reject(RejectReason::CircuitOpen, Some(remaining)));
        }

        if !self.state.in_flight.insert(job_key.clone()) {
            return Err(self.reject(RejectReason::AlreadyRunning, None));
        }

        let rate_key = AdmissionKey::new(notify_target, client_address);
        if let Err(retry_after) = self.state.limiter.check_at(&rate_key, now) {
            self.state.in_flight.remove(&job_key);
            return Err(self.reject(RejectReason::TooManyRequests, Some(retry_after)));
        }

        debug!(
            notify_target = %job_key.notify_target,
            collection_id = %job_key.collection_id,
            "Submission admitted"
        );

        Ok(AdmissionPermit {
            state: Arc::clone(&self.state),
            key: job_key,
            released: false,
        })
    }

    fn reject(&self, reason: RejectReason, retry_after: Option<Duration>) -> Rejection {
        info!(
            reason = %reason,
            retry_after_secs = retry_after.map(|d| d.as_secs()),
            "Submission rejected"
        );
        Rejection {
            reason,
            retry_after,
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drop idle rate records and stale breaker entries
    pub fn sweep_at(&self, now: Instant) -> usize {
        let removed = self.state.limiter.sweep_at(now) + self.state.breaker.sweep_at(now);
        if removed > 0 {
            debug!(removed, "Admission state swept");
        }
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.state.limiter.tracked_keys()
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight.len()
    }
}

/// Held for the lifetime of an admitted job.
///
/// Dropping it frees the collection's in-flight slot; [`finish`](Self::finish)
/// also reports the outcome to the circuit breaker.
#[derive(Debug)]
pub struct AdmissionPermit {
    state: Arc<GuardState>,
    key: JobKey,
    released: bool,
}

impl AdmissionPermit {
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn finish(self, success: bool) {
        self.finish_at(success, Instant::now());
    }

    pub fn finish_at(mut self, success: bool, now: Instant) {
        if success {
            self.state.breaker.record_success(&self.key);
        } else {
            self.state.breaker.record_failure_at(&self.key, now);
        }
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.state.in_flight.remove(&self.key);
            self.released = true;
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.release();
    }
}
