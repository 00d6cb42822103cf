//! # Admission Controller
//!
//! Per-request decision between grading immediately and queueing.
//!
//! ## Overview
//!
//! A grading request admitted inside the rate budget is executed
//! synchronously: the caller gets the graded result in the response to the
//! request that asked for it. Anything else lands in the durable queue and
//! the caller gets a position and an ETA instead. Callers never see a grader
//! error from this path — a failed immediate call silently falls back to the
//! queue at elevated priority.

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::events::topics;
use crate::models::{JobStatus, NewGradingJob, PRIORITY_NORMAL};
use crate::queue::core::GradingQueueCore;
use crate::services::GradingResponse;

/// Caller-side grading request: which submission, for whom, how urgent.
#[derive(Debug, Clone)]
pub struct GradingJobRequest {
    pub submission_uuid: Uuid,
    pub owner_uuid: Uuid,
    pub priority: i32,
}

impl GradingJobRequest {
    pub fn new(submission_uuid: Uuid, owner_uuid: Uuid) -> Self {
        Self {
            submission_uuid,
            owner_uuid,
            priority: PRIORITY_NORMAL,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// What the caller gets back from [`GradingQueueCore::submit_or_queue`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdmissionOutcome {
    /// Graded synchronously; results already applied to the submission.
    Graded { response: GradingResponse },
    /// Deferred; the submission will be graded by the drain loop.
    Queued { position: i64, eta_seconds: u64 },
}

impl GradingQueueCore {
    /// Grade a submission now if the rate budget allows, otherwise queue it.
    ///
    /// Never surfaces a grader error: the immediate path falls back to the
    /// queue on any failure, so callers always receive either a graded
    /// result or a queue position.
    pub async fn submit_or_queue(&self, request: GradingJobRequest) -> Result<AdmissionOutcome> {
        if self.limiter.can_proceed() {
            self.limiter.record();
            self.in_flight.insert(request.submission_uuid);
            let graded = self.grade_immediately(&request).await;
            self.in_flight.remove(&request.submission_uuid);

            match graded {
                Ok(response) => {
                    info!(
                        submission_uuid = %request.submission_uuid,
                        total_score = response.total_score,
                        "🟢 Submission graded on the immediate path"
                    );
                    return Ok(AdmissionOutcome::Graded { response });
                }
                Err(e) => {
                    warn!(
                        submission_uuid = %request.submission_uuid,
                        error = %e,
                        "Immediate grading failed, falling back to queue"
                    );
                    return self
                        .enqueue_or_existing(&request, self.config.retry_priority_boost)
                        .await;
                }
            }
        }

        debug!(
            submission_uuid = %request.submission_uuid,
            "Rate budget exhausted, queueing submission"
        );
        self.enqueue_or_existing(&request, request.priority).await
    }

    async fn grade_immediately(&self, request: &GradingJobRequest) -> Result<GradingResponse> {
        let payload = self
            .submissions
            .load_grading_request(request.submission_uuid)
            .await?;
        let response = self
            .grader
            .grade(&payload)
            .await
            .map_err(|e| crate::error::ClassmarkError::GradingError(e.to_string()))?;
        self.submissions
            .apply_graded_results(request.submission_uuid, &response)
            .await?;
        Ok(response)
    }

    /// Insert a queue row for the submission, or report the existing active
    /// row's position. Duplicate enqueues are idempotent by design.
    async fn enqueue_or_existing(
        &self,
        request: &GradingJobRequest,
        priority: i32,
    ) -> Result<AdmissionOutcome> {
        if let Some(existing) = self
            .store
            .find_latest_by_submission(request.submission_uuid)
            .await?
        {
            if existing.status.is_active() {
                debug!(
                    submission_uuid = %request.submission_uuid,
                    grading_job_uuid = %existing.grading_job_uuid,
                    "Submission already queued, returning existing position"
                );
                return self.queued_outcome(&existing).await;
            }
        }

        let job = self
            .store
            .insert(
                NewGradingJob::new(request.submission_uuid, request.owner_uuid)
                    .with_priority(priority),
            )
            .await?;

        info!(
            grading_job_uuid = %job.grading_job_uuid,
            submission_uuid = %job.submission_uuid,
            priority = job.priority,
            "📋 Grading job queued"
        );
        self.publish_event(
            topics::JOB_QUEUED,
            serde_json::json!({
                "grading_job_uuid": job.grading_job_uuid,
                "submission_uuid": job.submission_uuid,
                "priority": job.priority,
            }),
        )
        .await;

        let outcome = self.queued_outcome(&job).await?;
        self.trigger_drain();
        Ok(outcome)
    }

    async fn queued_outcome(&self, job: &crate::models::GradingJob) -> Result<AdmissionOutcome> {
        if job.status == JobStatus::Processing {
            // Already handed to the grader; report it as the head of the line.
            return Ok(AdmissionOutcome::Queued {
                position: 0,
                eta_seconds: self.config.per_item_eta.as_secs(),
            });
        }

        let (position, eta_seconds) = self.queued_position(job).await?;
        Ok(AdmissionOutcome::Queued {
            position,
            eta_seconds,
        })
    }
}
