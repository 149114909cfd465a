//! # Error Backoff
//!
//! Per-resource exponential backoff for failed reconcile passes.
//!
//! The delay doubles with every consecutive error, starting at the minimum
//! and capped at the maximum. A successful pass resets the resource.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Exponential backoff sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    min_secs: u64,
    max_secs: u64,
}

impl ExponentialBackoff {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
        }
    }

    /// Delay after `error_count` consecutive errors (1-based)
    pub fn delay_for(&self, error_count: u32) -> Duration {
        let exponent = error_count.saturating_sub(1).min(32);
        let secs = self
            .min_secs
            .saturating_mul(1u64 << exponent)
            .min(self.max_secs);
        Duration::from_secs(secs)
    }
}

/// Consecutive error counts keyed by resource
#[derive(Debug)]
pub struct BackoffTracker {
    backoff: ExponentialBackoff,
    errors: Mutex<HashMap<String, u32>>,
}

impl BackoffTracker {
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            errors: Mutex::new(HashMap::new()),
        }
    }

    /// Record an error for `key` and return the delay before the next attempt
    ///
    /// A poisoned lock falls back to the maximum delay.
    pub fn record_error(&self, key: &str) -> (Duration, u32) {
        match self.errors.lock() {
            Ok(mut errors) => {
                let count = errors.entry(key.to_string()).or_insert(0);
                *count = count.saturating_add(1);
                (self.backoff.delay_for(*count), *count)
            }
            Err(_) => (Duration::from_secs(self.backoff.max_secs), 0),
        }
    }

    /// Forget the errors of `key` after a successful pass
    pub fn reset(&self, key: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        let backoff = ExponentialBackoff::new(1, 300);
        let delays: Vec<u64> = (1..=10).map(|n| backoff.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 300]);
        assert_eq!(backoff.delay_for(u32::MAX).as_secs(), 300);
    }

    #[test]
    fn test_tracker_is_per_resource_and_resets() {
        let tracker = BackoffTracker::new(ExponentialBackoff::new(1, 300));
        assert_eq!(tracker.record_error("a").0.as_secs(), 1);
        assert_eq!(tracker.record_error("a").0.as_secs(), 2);
        assert_eq!(tracker.record_error("b").0.as_secs(), 1);
        tracker.reset("a");
        assert_eq!(tracker.record_error("a"), (Duration::from_secs(1), 1));
    }
}
