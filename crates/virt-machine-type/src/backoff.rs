//! Per-key exponential requeue delays
//!
//! Failed keys are retried after `base * 2^failures`, capped at `max`.
//! A successful reconcile forgets the key.

use std::time::Duration;

use dashmap::DashMap;

use crate::cache::ObjectKey;

/// Initial requeue delay after a first failure
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);
/// Upper bound on the requeue delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Item-based exponential failure rate limiter
#[derive(Debug)]
pub struct RequeueBackoff {
    base: Duration,
    max: Duration,
    failures: DashMap<ObjectKey, u32>,
}

impl Default for RequeueBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl RequeueBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: DashMap::new(),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn next_delay(&self, key: &ObjectKey) -> Duration {
        let mut failures = self.failures.entry(key.clone()).or_insert(0);
        let exponent = *failures;
        *failures = failures.saturating_add(1);

        let factor = 1u32 << exponent.min(31);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Forget the failure history of `key`
    pub fn reset(&self, key: &ObjectKey) {
        self.failures.remove(key);
    }

    /// Number of consecutive failures recorded for `key`
    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures.get(key).map(|f| *f).unwrap_or(0)
    }
}
