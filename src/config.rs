use crate::error::{ClassmarkError, Result};
use std::time::Duration;

/// Runtime configuration for the grading queue core.
///
/// Defaults reflect the limits of the external AI grading service (15 calls
/// per rolling minute) and the recovery/retention policy of the platform.
/// A subset of values can be overridden from the environment for deployment
/// tuning; everything else is fixed at construction time.
#[derive(Debug, Clone)]
pub struct GradingQueueConfig {
    pub database_url: String,
    /// Trailing window for the external-call rate limit.
    pub rate_limit_window_ms: u64,
    /// Maximum external calls admitted inside one window, process-wide.
    pub rate_limit_max_calls: usize,
    /// Attempts before a job is marked failed and handed to manual grading.
    pub max_attempts: i32,
    /// Age after which a processing job (or a held drain lock) is considered stuck.
    pub stuck_timeout: Duration,
    /// Periodic driver tick between drain invocations.
    pub drain_interval: Duration,
    /// Minimum spacing between enqueue-triggered background drains.
    pub trigger_debounce: Duration,
    /// Age after which completed/failed jobs are deleted.
    pub retention_period: Duration,
    /// Tick between retention sweeps.
    pub retention_interval: Duration,
    /// Observed per-job latency of the external grading call, used for ETAs.
    pub per_item_eta: Duration,
    /// How long the processing-count memo used by status polling stays fresh.
    pub processing_count_cache_ttl: Duration,
    /// Sleep applied while throttled when the limiter cannot say when a slot frees.
    pub throttle_poll_fallback: Duration,
    /// Pacing sleep between drained jobs.
    pub inter_item_delay: Duration,
    /// Priority assigned when a failed immediate attempt falls back to the queue.
    pub retry_priority_boost: i32,
}

impl Default for GradingQueueConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/classmark_development".to_string(),
            rate_limit_window_ms: 60_000,
            rate_limit_max_calls: 15,
            max_attempts: 3,
            stuck_timeout: Duration::from_secs(300),
            drain_interval: Duration::from_secs(5),
            trigger_debounce: Duration::from_secs(5),
            retention_period: Duration::from_secs(24 * 60 * 60),
            retention_interval: Duration::from_secs(24 * 60 * 60),
            per_item_eta: Duration::from_secs(4),
            processing_count_cache_ttl: Duration::from_secs(3),
            throttle_poll_fallback: Duration::from_secs(1),
            inter_item_delay: Duration::from_millis(100),
            retry_priority_boost: 10,
        }
    }
}

impl GradingQueueConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(max_calls) = std::env::var("CLASSMARK_RATE_LIMIT_MAX_CALLS") {
            config.rate_limit_max_calls = max_calls.parse().map_err(|e| {
                ClassmarkError::ConfigurationError(format!("Invalid rate_limit_max_calls: {e}"))
            })?;
        }

        if let Ok(window_ms) = std::env::var("CLASSMARK_RATE_LIMIT_WINDOW_MS") {
            config.rate_limit_window_ms = window_ms.parse().map_err(|e| {
                ClassmarkError::ConfigurationError(format!("Invalid rate_limit_window_ms: {e}"))
            })?;
        }

        if let Ok(max_attempts) = std::env::var("CLASSMARK_MAX_ATTEMPTS") {
            config.max_attempts = max_attempts.parse().map_err(|e| {
                ClassmarkError::ConfigurationError(format!("Invalid max_attempts: {e}"))
            })?;
        }

        if let Ok(drain_ms) = std::env::var("CLASSMARK_DRAIN_INTERVAL_MS") {
            let ms: u64 = drain_ms.parse().map_err(|e| {
                ClassmarkError::ConfigurationError(format!("Invalid drain_interval_ms: {e}"))
            })?;
            config.drain_interval = Duration::from_millis(ms);
        }

        if let Ok(retention_hours) = std::env::var("CLASSMARK_RETENTION_HOURS") {
            let hours: u64 = retention_hours.parse().map_err(|e| {
                ClassmarkError::ConfigurationError(format!("Invalid retention_hours: {e}"))
            })?;
            config.retention_period = Duration::from_secs(hours * 60 * 60);
        }

        Ok(config)
    }

    /// Stuck threshold as a chrono duration, for comparison against row timestamps.
    pub fn stuck_timeout_chrono(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.stuck_timeout.as_millis() as i64)
    }

    /// Retention threshold as a chrono duration.
    pub fn retention_period_chrono(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.retention_period.as_millis() as i64)
    }
}
