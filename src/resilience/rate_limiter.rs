//! # Sliding-Window Rate Limiter
//!
//! Process-wide call budget for the external grading service: at most
//! `max_calls` timestamps inside the trailing `window`. Every check prunes
//! timestamps that have left the window, so the limiter carries no background
//! task and no persistence — a restart simply starts a fresh window.
//!
//! ## Soft cap
//!
//! `can_proceed` and `record` are deliberately separate operations. Callers
//! on the immediate admission path check first and record only once they
//! commit to calling out, which means truly parallel callers can interleave
//! between check and record and transiently admit slightly more than
//! `max_calls` per window. This is an accepted relaxation: the provider quota
//! has headroom for it, and collapsing the pair into one atomic operation
//! would change observable throughput for well-behaved callers.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::config::GradingQueueConfig;

/// Point-in-time snapshot of the limiter, served to status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStatus {
    /// Calls recorded inside the current window
    pub current_calls: usize,
    /// Window call budget
    pub max_calls: usize,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Budget remaining right now
    pub available_slots: usize,
    /// Milliseconds until the oldest recorded call leaves the window; `None`
    /// while slots are available
    pub next_slot_in_ms: Option<u64>,
}

/// Sliding-window limiter over the external grading call budget.
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    window: Duration,
    max_calls: usize,
    calls: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowRateLimiter {
    /// Create a limiter from the queue configuration.
    pub fn new(config: &GradingQueueConfig) -> Self {
        info!(
            max_calls = config.rate_limit_max_calls,
            window_ms = config.rate_limit_window_ms,
            "🛡️ Grading rate limiter initialized"
        );

        Self {
            window: Duration::from_millis(config.rate_limit_window_ms),
            max_calls: config.rate_limit_max_calls,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Check whether a call can be admitted right now.
    pub fn can_proceed(&self) -> bool {
        let mut calls = self.calls.lock();
        Self::prune(&mut calls, self.window);
        calls.len() < self.max_calls
    }

    /// Record an admitted call. The caller is expected to have confirmed
    /// `can_proceed` first; the limiter does not enforce the pairing.
    pub fn record(&self) {
        let mut calls = self.calls.lock();
        calls.push_back(Instant::now());
    }

    /// Snapshot the window for status reporting.
    pub fn status(&self) -> RateLimiterStatus {
        let mut calls = self.calls.lock();
        Self::prune(&mut calls, self.window);

        let current_calls = calls.len();
        let available_slots = self.max_calls.saturating_sub(current_calls);
        let next_slot_in_ms = if available_slots == 0 {
            calls.front().map(|oldest| {
                let elapsed = oldest.elapsed();
                self.window.saturating_sub(elapsed).as_millis() as u64
            })
        } else {
            None
        };

        RateLimiterStatus {
            current_calls,
            max_calls: self.max_calls,
            window_ms: self.window.as_millis() as u64,
            available_slots,
            next_slot_in_ms,
        }
    }

    fn prune(calls: &mut VecDeque<Instant>, window: Duration) {
        let now = Instant::now();
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, pause};

    fn limiter(max_calls: usize, window_ms: u64) -> SlidingWindowRateLimiter {
        let config = GradingQueueConfig {
            rate_limit_max_calls: max_calls,
            rate_limit_window_ms: window_ms,
            ..GradingQueueConfig::default()
        };
        SlidingWindowRateLimiter::new(&config)
    }

    #[tokio::test]
    async fn test_admits_up_to_cap() {
        pause();
        let limiter = limiter(3, 60_000);

        for _ in 0..3 {
            assert!(limiter.can_proceed());
            limiter.record();
        }
        assert!(!limiter.can_proceed());
    }

    #[tokio::test]
    async fn test_slots_free_after_window_passes() {
        pause();
        let limiter = limiter(2, 60_000);

        limiter.record();
        limiter.record();
        assert!(!limiter.can_proceed());

        advance(Duration::from_millis(60_001)).await;
        assert!(limiter.can_proceed());

        let status = limiter.status();
        assert_eq!(status.current_calls, 0);
        assert_eq!(status.available_slots, 2);
    }

    #[tokio::test]
    async fn test_partial_window_expiry() {
        pause();
        let limiter = limiter(2, 60_000);

        limiter.record();
        advance(Duration::from_millis(30_000)).await;
        limiter.record();
        assert!(!limiter.can_proceed());

        // First call leaves the window, second is still inside it
        advance(Duration::from_millis(30_001)).await;
        assert!(limiter.can_proceed());
        assert_eq!(limiter.status().current_calls, 1);
    }

    #[tokio::test]
    async fn test_status_reports_next_slot_when_saturated() {
        pause();
        let limiter = limiter(1, 60_000);

        limiter.record();
        advance(Duration::from_millis(15_000)).await;

        let status = limiter.status();
        assert_eq!(status.available_slots, 0);
        assert_eq!(status.next_slot_in_ms, Some(45_000));
    }

    #[tokio::test]
    async fn test_status_has_no_next_slot_while_open() {
        pause();
        let limiter = limiter(5, 60_000);

        limiter.record();
        let status = limiter.status();
        assert_eq!(status.current_calls, 1);
        assert_eq!(status.available_slots, 4);
        assert_eq!(status.next_slot_in_ms, None);
    }
}
