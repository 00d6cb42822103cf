//! In-memory job store for tests and local development.
//!
//! Holds every row under a single async mutex. Insertion order is tracked
//! with a monotonic sequence so drain order and position counts stay
//! deterministic even when two rows share a `created_at` timestamp.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ClassmarkError, Result};
use crate::models::{GradingJob, JobStatus, NewGradingJob};
use crate::store::JobStore;

#[derive(Debug, Clone)]
struct StoredJob {
    job: GradingJob,
    seq: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    jobs: HashMap<Uuid, StoredJob>,
    next_seq: u64,
}

impl MemoryState {
    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn get_mut(&mut self, grading_job_uuid: Uuid) -> Result<&mut StoredJob> {
        self.jobs.get_mut(&grading_job_uuid).ok_or_else(|| {
            ClassmarkError::InvalidStateError(format!(
                "Grading job {grading_job_uuid} not found"
            ))
        })
    }
}

/// In-memory [`JobStore`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: Mutex<MemoryState>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a job by id, for assertions in tests.
    pub async fn get(&self, grading_job_uuid: Uuid) -> Option<GradingJob> {
        let state = self.state.lock().await;
        state.jobs.get(&grading_job_uuid).map(|s| s.job.clone())
    }

    /// Overwrite a job's `started_at`, for exercising stuck-row recovery.
    pub async fn set_started_at(
        &self,
        grading_job_uuid: Uuid,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.get_mut(grading_job_uuid)?.job.started_at = started_at;
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, new_job: NewGradingJob) -> Result<GradingJob> {
        let mut state = self.state.lock().await;
        let seq = state.allocate_seq();
        let job = GradingJob {
            grading_job_uuid: Uuid::new_v4(),
            submission_uuid: new_job.submission_uuid,
            owner_uuid: new_job.owner_uuid,
            priority: new_job.priority,
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        state
            .jobs
            .insert(job.grading_job_uuid, StoredJob { job: job.clone(), seq });
        Ok(job)
    }

    async fn find_latest_by_submission(
        &self,
        submission_uuid: Uuid,
    ) -> Result<Option<GradingJob>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|s| s.job.submission_uuid == submission_uuid)
            .max_by_key(|s| (s.job.created_at, s.seq))
            .map(|s| s.job.clone()))
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state.jobs.values().filter(|s| s.job.status == status).count() as i64)
    }

    async fn next_queued(&self) -> Result<Option<GradingJob>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|s| s.job.status == JobStatus::Queued)
            .min_by_key(|s| (Reverse(s.job.priority), s.job.created_at, s.seq))
            .map(|s| s.job.clone()))
    }

    async fn queued_ahead_of(&self, job: &GradingJob) -> Result<i64> {
        let state = self.state.lock().await;
        let reference = state
            .jobs
            .get(&job.grading_job_uuid)
            .map(|s| (s.job.created_at, s.seq))
            .unwrap_or((job.created_at, u64::MAX));
        Ok(state
            .jobs
            .values()
            .filter(|s| s.job.status == JobStatus::Queued)
            .filter(|s| (s.job.created_at, s.seq) < reference)
            .count() as i64)
    }

    async fn mark_processing(&self, grading_job_uuid: Uuid) -> Result<GradingJob> {
        let mut state = self.state.lock().await;
        let stored = state.get_mut(grading_job_uuid)?;
        stored.job.status = JobStatus::Processing;
        stored.job.attempts += 1;
        stored.job.started_at = Some(Utc::now());
        Ok(stored.job.clone())
    }

    async fn mark_completed(&self, grading_job_uuid: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state.get_mut(grading_job_uuid)?;
        stored.job.status = JobStatus::Completed;
        stored.job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn requeue(&self, grading_job_uuid: Uuid, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state.get_mut(grading_job_uuid)?;
        stored.job.status = JobStatus::Queued;
        stored.job.last_error = Some(error.to_string());
        stored.job.started_at = None;
        Ok(())
    }

    async fn mark_failed(&self, grading_job_uuid: Uuid, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state.get_mut(grading_job_uuid)?;
        stored.job.status = JobStatus::Failed;
        stored.job.last_error = Some(error.to_string());
        stored.job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn revert_stuck(
        &self,
        stuck_before: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<GradingJob>> {
        let mut state = self.state.lock().await;
        let mut reverted = Vec::new();
        for stored in state.jobs.values_mut() {
            let is_stuck = stored.job.status == JobStatus::Processing
                && stored
                    .job
                    .started_at
                    .map(|started| started < stuck_before)
                    .unwrap_or(false);
            if is_stuck {
                stored.job.status = JobStatus::Queued;
                stored.job.last_error = Some(error.to_string());
                stored.job.started_at = None;
                reverted.push(stored.job.clone());
            }
        }
        Ok(reverted)
    }

    async fn fail_all_active(&self, error: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for stored in state.jobs.values_mut() {
            if stored.job.status.is_active() {
                stored.job.status = JobStatus::Failed;
                stored.job.last_error = Some(error.to_string());
                stored.job.completed_at = Some(Utc::now());
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state.jobs.retain(|_, stored| {
            !(stored.job.status.is_terminal()
                && stored
                    .job
                    .completed_at
                    .map(|finished| finished < cutoff)
                    .unwrap_or(false))
        });
        Ok((before - state.jobs.len()) as u64)
    }

    async fn active_jobs_for_owner(&self, owner_uuid: Uuid) -> Result<Vec<GradingJob>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<_> = state
            .jobs
            .values()
            .filter(|s| s.job.owner_uuid == owner_uuid && s.job.status.is_active())
            .map(|s| (s.job.created_at, s.seq, s.job.clone()))
            .collect();
        jobs.sort_by_key(|(created_at, seq, _)| (*created_at, *seq));
        Ok(jobs.into_iter().map(|(_, _, job)| job).collect())
    }
}
