//! # Queue Drain Loop
//!
//! Single-flight background loop that empties the grading queue.
//!
//! ## Overview
//!
//! One logical drain runs per process, guarded by a cooperative lock. Each
//! run first recovers work stranded by a previous crash (stuck lock, stuck
//! processing rows), then repeatedly takes the highest-priority oldest queued
//! job, meters it through the rate limiter, calls the grading service, and
//! applies the outcome:
//!
//! - success → results applied to the submission, job completed, owner
//!   notified
//! - failure with retry budget left → job returned to the queue (no backoff
//!   beyond the limiter's own pacing; retries interleave with other work by
//!   priority and age)
//! - failure with budget exhausted → job failed, submission flagged for
//!   manual grading, owner notified
//!
//! ## Locking
//!
//! The drain lock is a plain flag plus an acquired-at timestamp, mutated
//! under a sync mutex with no suspension point between check and set. That is
//! only safe because a single process owns the store; the lock is not a
//! cross-instance mechanism. A lock held past the stuck timeout is assumed
//! leaked by a crashed run and is force-cleared by the next trigger.

use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::events::topics;
use crate::models::{GradingJob, JobStatus};
use crate::queue::core::GradingQueueCore;
use crate::services::GradingNotification;

const STUCK_JOB_ERROR: &str = "Processing timed out and the job was returned to the queue";

#[derive(Debug, Default)]
struct DrainLockState {
    held: bool,
    acquired_at: Option<Instant>,
}

/// Cooperative single-flight lock for the drain loop.
#[derive(Debug, Default)]
pub(crate) struct DrainLock {
    state: Mutex<DrainLockState>,
}

/// Result of the pre-acquisition check.
enum Preflight {
    /// Lock free (a stale holder may have been cleared on the way).
    Clear { forced_takeover: bool },
    /// Another drain is legitimately in flight.
    Busy,
}

impl DrainLock {
    /// Clear a stale holder, then report whether the lock is free.
    fn preflight(&self, stuck_after: Duration) -> Preflight {
        let mut state = self.state.lock();
        if state.held {
            let stale = state
                .acquired_at
                .map(|at| at.elapsed() > stuck_after)
                .unwrap_or(true);
            if !stale {
                return Preflight::Busy;
            }
            state.held = false;
            state.acquired_at = None;
            return Preflight::Clear {
                forced_takeover: true,
            };
        }
        Preflight::Clear {
            forced_takeover: false,
        }
    }

    /// Take the lock unless someone else acquired it since preflight.
    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.held {
            return false;
        }
        state.held = true;
        state.acquired_at = Some(Instant::now());
        true
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.held = false;
        state.acquired_at = None;
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self) -> bool {
        self.state.lock().held
    }
}

/// Releases the drain lock on every exit path, including error aborts.
struct DrainLockGuard<'a>(&'a DrainLock);

impl Drop for DrainLockGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl GradingQueueCore {
    /// Run one drain pass. No-op when another drain is in flight or the
    /// queue is empty; otherwise loops until the queue is drained.
    pub async fn drain(&self) -> Result<()> {
        match self.drain_lock.preflight(self.config.stuck_timeout) {
            Preflight::Busy => {
                debug!("Drain already in flight, skipping");
                return Ok(());
            }
            Preflight::Clear {
                forced_takeover: true,
            } => {
                warn!(
                    stuck_timeout_secs = self.config.stuck_timeout.as_secs(),
                    "🚨 Drain lock held past the stuck timeout, force-clearing"
                );
            }
            Preflight::Clear { .. } => {}
        }

        // Cheap short-circuit before taking the lock
        if self.store.count_by_status(JobStatus::Queued).await? == 0 {
            return Ok(());
        }

        if !self.drain_lock.try_acquire() {
            debug!("Drain lock taken while counting, skipping");
            return Ok(());
        }
        let _guard = DrainLockGuard(&self.drain_lock);

        self.sweep_stuck_jobs().await?;
        self.drain_queue().await
    }

    /// Revert processing rows whose attempt outlived the stuck timeout.
    /// Compensates for crashes and swallowed failures; attempts are not
    /// consumed by the sweep itself.
    async fn sweep_stuck_jobs(&self) -> Result<()> {
        let cutoff = chrono::Utc::now() - self.config.stuck_timeout_chrono();
        let reverted = self.store.revert_stuck(cutoff, STUCK_JOB_ERROR).await?;

        for job in &reverted {
            warn!(
                grading_job_uuid = %job.grading_job_uuid,
                submission_uuid = %job.submission_uuid,
                attempts = job.attempts,
                "🚨 Reverted stuck grading job to queued"
            );
            self.in_flight.remove(&job.submission_uuid);
        }

        Ok(())
    }

    async fn drain_queue(&self) -> Result<()> {
        info!("🔧 Drain loop started");
        let mut processed: u64 = 0;

        loop {
            self.wait_for_rate_budget().await;

            let Some(job) = self.store.next_queued().await? else {
                break;
            };

            // Defensive: the immediate admission path may be grading this
            // submission right now.
            if self.in_flight.contains(&job.submission_uuid) {
                debug!(
                    submission_uuid = %job.submission_uuid,
                    "Submission already in flight, skipping"
                );
                sleep(self.config.inter_item_delay).await;
                continue;
            }

            let job = self.store.mark_processing(job.grading_job_uuid).await?;
            self.in_flight.insert(job.submission_uuid);
            self.limiter.record();

            let result = self.process_job(&job).await;
            self.in_flight.remove(&job.submission_uuid);
            result?;

            processed += 1;
            // Pace calls even within rate-limit allowance
            sleep(self.config.inter_item_delay).await;
        }

        info!(processed, "🏁 Drain loop finished, queue empty");
        Ok(())
    }

    /// Sleep while the limiter is saturated.
    async fn wait_for_rate_budget(&self) {
        loop {
            if self.limiter.can_proceed() {
                return;
            }
            let wait = self
                .limiter
                .status()
                .next_slot_in_ms
                .map(|ms| Duration::from_millis(ms.max(1)))
                .unwrap_or(self.config.throttle_poll_fallback);
            debug!(wait_ms = wait.as_millis() as u64, "Throttled, waiting for a rate slot");
            sleep(wait).await;
        }
    }

    /// Grade one claimed job and apply the outcome. Store failures propagate;
    /// grader and gateway failures are converted into retry/terminal
    /// transitions.
    async fn process_job(&self, job: &GradingJob) -> Result<()> {
        let mut subject_title: Option<String> = None;
        let graded: std::result::Result<crate::services::GradingResponse, String> = async {
            let payload = self
                .submissions
                .load_grading_request(job.submission_uuid)
                .await
                .map_err(|e| e.to_string())?;
            subject_title = Some(payload.subject_title.clone());

            let response = self
                .grader
                .grade(&payload)
                .await
                .map_err(|e| e.to_string())?;

            // Single transaction inside the gateway implementation
            self.submissions
                .apply_graded_results(job.submission_uuid, &response)
                .await
                .map_err(|e| e.to_string())?;
            Ok(response)
        }
        .await;

        match graded {
            Ok(response) => self.complete_job(job, &response, subject_title.as_deref()).await,
            Err(error) => self.handle_job_failure(job, &error, subject_title.as_deref()).await,
        }
    }

    async fn complete_job(
        &self,
        job: &GradingJob,
        response: &crate::services::GradingResponse,
        subject_title: Option<&str>,
    ) -> Result<()> {
        self.store.mark_completed(job.grading_job_uuid).await?;

        info!(
            grading_job_uuid = %job.grading_job_uuid,
            submission_uuid = %job.submission_uuid,
            attempts = job.attempts,
            total_score = response.total_score,
            total_possible = response.total_possible,
            "🟢 Grading job completed"
        );

        let notification = GradingNotification::completed(
            job.owner_uuid,
            job.submission_uuid,
            subject_title.unwrap_or("Your submission"),
        );
        if let Err(e) = self.notifier.grading_completed(&notification).await {
            error!("❌ Completion notification failed: {e}");
        }

        self.publish_event(
            topics::JOB_COMPLETED,
            json!({
                "grading_job_uuid": job.grading_job_uuid,
                "submission_uuid": job.submission_uuid,
                "attempts": job.attempts,
                "total_score": response.total_score,
            }),
        )
        .await;

        Ok(())
    }

    async fn handle_job_failure(
        &self,
        job: &GradingJob,
        error: &str,
        subject_title: Option<&str>,
    ) -> Result<()> {
        if job.attempts < self.config.max_attempts {
            warn!(
                grading_job_uuid = %job.grading_job_uuid,
                submission_uuid = %job.submission_uuid,
                attempts = job.attempts,
                max_attempts = self.config.max_attempts,
                error,
                "🔴 Grading attempt failed, requeueing"
            );
            self.store.requeue(job.grading_job_uuid, error).await?;
            self.publish_event(
                topics::JOB_RETRIED,
                json!({
                    "grading_job_uuid": job.grading_job_uuid,
                    "submission_uuid": job.submission_uuid,
                    "attempts": job.attempts,
                    "error": error,
                }),
            )
            .await;
            return Ok(());
        }

        error!(
            grading_job_uuid = %job.grading_job_uuid,
            submission_uuid = %job.submission_uuid,
            attempts = job.attempts,
            error,
            "❌ Grading job failed, retry budget exhausted"
        );
        self.store.mark_failed(job.grading_job_uuid, error).await?;

        if let Err(e) = self
            .submissions
            .mark_needs_manual_grading(job.submission_uuid, error)
            .await
        {
            error!("❌ Failed to flag submission for manual grading: {e}");
        }

        let notification =
            GradingNotification::failed(job.owner_uuid, job.submission_uuid, subject_title);
        if let Err(e) = self.notifier.grading_failed(&notification).await {
            error!("❌ Failure notification failed: {e}");
        }

        self.publish_event(
            topics::JOB_FAILED,
            json!({
                "grading_job_uuid": job.grading_job_uuid,
                "submission_uuid": job.submission_uuid,
                "attempts": job.attempts,
                "error": error,
            }),
        )
        .await;

        Ok(())
    }
}
