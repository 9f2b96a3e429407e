use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::AdmissionKey;

/// Sliding-window request counter per `(notify target, client address)`
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    records: DashMap<AdmissionKey, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests: max_requests.max(1),
            records: DashMap::new(),
        }
    }

    /// Prune, then accept and record `now`, or reject with the wait until a
    /// slot frees up. The whole check holds the key's shard lock.
    pub fn check_at(&self, key: &AdmissionKey, now: Instant) -> Result<(), Duration> {
        let mut record = self.records.entry(key.clone()).or_default();
        prune(&mut record, now, self.window);

        if record.len() >= self.max_requests {
            let retry_after = record
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            return Err(retry_after);
        }

        record.push_back(now);
        Ok(())
    }

    /// Prune every record and drop the ones left empty
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| {
            prune(record, now, self.window);
            !record.is_empty()
        });
        before.saturating_sub(self.records.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.records.len()
    }
}

fn prune(record: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = record.front() {
        if now.saturating_duration_since(*oldest) >= window {
            record.pop_front();
        } else {
            break;
        }
    }
}
