//! # Grading Queue Core
//!
//! The single long-lived service object behind admission, draining, and
//! status reporting. One instance is constructed at process start with the
//! platform's port implementations wired in, then shared (via `Arc`) with
//! every request handler and with the periodic driver.
//!
//! All coordination state that must be process-wide — the rate-limit window,
//! the drain lock, the in-flight submission markers, the trigger debounce,
//! and the processing-count memo — lives here as plain fields. None of it is
//! persisted: a restart starts with a clean window and an idle drain loop,
//! and the durable truth about queued work stays in the job store.

use std::sync::{Arc, Weak};

use dashmap::DashSet;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::GradingQueueConfig;
use crate::error::Result;
use crate::events::{topics, EventPublisher};
use crate::queue::drain::DrainLock;
use crate::resilience::{RateLimiterStatus, SlidingWindowRateLimiter};
use crate::services::{AnswerGrader, Notifier, SubmissionGateway};
use crate::store::JobStore;

/// Time-boxed memo for the processing-count used in ETA math.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CountMemo {
    pub count: i64,
    pub fetched_at: Instant,
}

/// Process-wide grading queue service.
pub struct GradingQueueCore {
    pub(crate) config: GradingQueueConfig,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) grader: Arc<dyn AnswerGrader>,
    pub(crate) submissions: Arc<dyn SubmissionGateway>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) events: EventPublisher,
    pub(crate) limiter: SlidingWindowRateLimiter,
    pub(crate) drain_lock: DrainLock,
    /// Submissions currently being graded by any path (immediate or drain).
    pub(crate) in_flight: DashSet<Uuid>,
    pub(crate) processing_count_cache: Mutex<Option<CountMemo>>,
    last_drain_trigger: Mutex<Option<Instant>>,
    /// Self-reference for spawning background drains from `&self` methods.
    self_ref: Weak<GradingQueueCore>,
}

impl GradingQueueCore {
    /// Construct the service with the platform's ports wired in.
    pub fn new(
        config: GradingQueueConfig,
        store: Arc<dyn JobStore>,
        grader: Arc<dyn AnswerGrader>,
        submissions: Arc<dyn SubmissionGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let limiter = SlidingWindowRateLimiter::new(&config);

        info!(
            max_attempts = config.max_attempts,
            stuck_timeout_secs = config.stuck_timeout.as_secs(),
            "🔧 Grading queue core initialized"
        );

        Arc::new_cyclic(|weak| Self {
            config,
            store,
            grader,
            submissions,
            notifier,
            events: EventPublisher::default(),
            limiter,
            drain_lock: DrainLock::default(),
            in_flight: DashSet::new(),
            processing_count_cache: Mutex::new(None),
            last_drain_trigger: Mutex::new(None),
            self_ref: weak.clone(),
        })
    }

    /// Subscribe-side access to lifecycle events.
    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Snapshot of the external-call rate limiter, for status endpoints.
    pub fn limiter_status(&self) -> RateLimiterStatus {
        self.limiter.status()
    }

    /// Fire-and-forget background drain, debounced so burst enqueues do not
    /// stampede the loop. Errors in the spawned drain are logged, never
    /// propagated to the caller that triggered it.
    pub fn trigger_drain(&self) {
        {
            let mut last = self.last_drain_trigger.lock();
            if let Some(triggered_at) = *last {
                if triggered_at.elapsed() < self.config.trigger_debounce {
                    debug!("Drain trigger debounced");
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        let Some(core) = self.self_ref.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = core.drain().await {
                error!("❌ Background drain failed: {e}");
            }
        });
    }

    /// Administratively fail every queued and processing job.
    ///
    /// Used together with [`PeriodicDriver::stop`](crate::queue::PeriodicDriver::stop)
    /// to halt all background AI work. In-flight external calls are not
    /// aborted; they run to completion against already-failed rows.
    pub async fn cancel_all_jobs(&self, reason: &str) -> Result<u64> {
        let cancelled = self.store.fail_all_active(reason).await?;
        self.in_flight.clear();

        warn!(cancelled, reason, "🚨 Cancelled all active grading jobs");
        self.publish_event(
            topics::QUEUE_CANCELLED,
            json!({ "cancelled": cancelled, "reason": reason }),
        )
        .await;

        Ok(cancelled)
    }

    /// Delete completed/failed jobs older than the retention period.
    pub async fn run_retention_sweep(&self) -> Result<u64> {
        let cutoff = chrono::Utc::now() - self.config.retention_period_chrono();
        let removed = self.store.delete_finished_before(cutoff).await?;

        if removed > 0 {
            info!(removed, "💾 Retention sweep removed finished grading jobs");
            self.publish_event(topics::QUEUE_SWEPT, json!({ "removed": removed }))
                .await;
        }

        Ok(removed)
    }

    pub(crate) async fn publish_event(&self, name: &str, context: serde_json::Value) {
        if let Err(e) = self.events.publish(name, context).await {
            debug!("Event publish failed: {e}");
        }
    }
}

impl std::fmt::Debug for GradingQueueCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingQueueCore")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}
