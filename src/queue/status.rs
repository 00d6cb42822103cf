//! # Status and Position Reporting
//!
//! Caller-facing view of where a submission sits in the grading queue,
//! computed without touching the drain loop. Students poll this from the
//! results page, so the processing-count used in ETA math is served from a
//! short-lived memo rather than hitting the store on every poll.

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{GradingJob, JobStatus};
use crate::queue::core::{CountMemo, GradingQueueCore};

/// Queue progress for one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobProgress {
    /// No grading job exists for this submission
    NotQueued,
    /// Waiting in the queue
    Queued { position: i64, eta_seconds: u64 },
    /// Being graded right now
    Processing,
    /// Graded; results live on the submission record
    Completed,
    /// Retry budget exhausted; submission went to manual grading
    Failed { error: Option<String> },
}

/// Progress entry for the owner-facing batch view.
#[derive(Debug, Clone, Serialize)]
pub struct OwnedJobStatus {
    pub submission_uuid: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub progress: JobProgress,
}

impl GradingQueueCore {
    /// Progress of the latest grading job for a submission.
    ///
    /// `NotQueued` means no job row exists at all, which is distinct from
    /// `Completed` (a job ran and its results are on the record).
    pub async fn position_of(&self, submission_uuid: Uuid) -> Result<JobProgress> {
        match self.store.find_latest_by_submission(submission_uuid).await? {
            None => Ok(JobProgress::NotQueued),
            Some(job) => self.progress_of(&job).await,
        }
    }

    /// Progress for every active job owned by a caller, oldest first.
    pub async fn active_jobs_for_owner(&self, owner_uuid: Uuid) -> Result<Vec<OwnedJobStatus>> {
        let jobs = self.store.active_jobs_for_owner(owner_uuid).await?;
        let mut statuses = Vec::with_capacity(jobs.len());
        for job in &jobs {
            statuses.push(OwnedJobStatus {
                submission_uuid: job.submission_uuid,
                created_at: job.created_at,
                progress: self.progress_of(job).await?,
            });
        }
        Ok(statuses)
    }

    pub(crate) async fn progress_of(&self, job: &GradingJob) -> Result<JobProgress> {
        match job.status {
            JobStatus::Queued => {
                let (position, eta_seconds) = self.queued_position(job).await?;
                Ok(JobProgress::Queued {
                    position,
                    eta_seconds,
                })
            }
            JobStatus::Processing => Ok(JobProgress::Processing),
            JobStatus::Completed => Ok(JobProgress::Completed),
            JobStatus::Failed => Ok(JobProgress::Failed {
                error: job.last_error.clone(),
            }),
        }
    }

    /// Position (1-based among queued rows, by age) and ETA for a queued job.
    pub(crate) async fn queued_position(&self, job: &GradingJob) -> Result<(i64, u64)> {
        let items_ahead = self.store.queued_ahead_of(job).await?;
        let processing = self.processing_count().await?;

        let position = items_ahead + 1;
        let slots_before_us = (items_ahead + processing + 1).max(1) as u64;
        let eta_seconds = slots_before_us * self.config.per_item_eta.as_secs();
        Ok((position, eta_seconds))
    }

    /// Processing-count memo: polling-heavy pages refresh every few seconds,
    /// and an estimate a few seconds stale does not change the ETA class.
    pub(crate) async fn processing_count(&self) -> Result<i64> {
        if let Some(memo) = *self.processing_count_cache.lock() {
            if memo.fetched_at.elapsed() < self.config.processing_count_cache_ttl {
                return Ok(memo.count);
            }
        }

        let count = self.store.count_by_status(JobStatus::Processing).await?;
        *self.processing_count_cache.lock() = Some(CountMemo {
            count,
            fetched_at: Instant::now(),
        });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_serde_shape() {
        let queued = JobProgress::Queued {
            position: 2,
            eta_seconds: 12,
        };
        let json = serde_json::to_value(&queued).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["position"], 2);
        assert_eq!(json["eta_seconds"], 12);

        let failed = JobProgress::Failed {
            error: Some("provider timeout".to_string()),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "provider timeout");
    }
}
