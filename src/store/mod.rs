//! # Durable Queue Store
//!
//! Persistence surface for [`GradingJob`] rows. The queue core is written
//! against the [`JobStore`] trait: production wires in [`PgJobStore`]
//! (Postgres via sqlx), tests and local development use
//! [`InMemoryJobStore`]. The core treats the store as a transactional table —
//! every transition below is a single statement on the backing store.
//!
//! ## Ordering contract
//!
//! `next_queued` returns the single queued row with the highest `priority`,
//! breaking ties by oldest `created_at`. `queued_ahead_of` counts queued rows
//! created strictly before a given row, which is what caller-facing queue
//! positions are computed from.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{GradingJob, JobStatus, NewGradingJob};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new queued job.
    async fn insert(&self, new_job: NewGradingJob) -> Result<GradingJob>;

    /// Most recent job for a submission, regardless of status.
    async fn find_latest_by_submission(&self, submission_uuid: Uuid)
        -> Result<Option<GradingJob>>;

    /// Number of jobs currently in the given status.
    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;

    /// The next queued job in drain order (priority desc, age asc), if any.
    async fn next_queued(&self) -> Result<Option<GradingJob>>;

    /// Queued jobs created strictly before the given job.
    async fn queued_ahead_of(&self, job: &GradingJob) -> Result<i64>;

    /// Transition a job to processing: increments `attempts`, stamps
    /// `started_at`, and returns the updated row.
    async fn mark_processing(&self, grading_job_uuid: Uuid) -> Result<GradingJob>;

    /// Transition a job to completed.
    async fn mark_completed(&self, grading_job_uuid: Uuid) -> Result<()>;

    /// Return a job to the queue after a failed attempt, recording the error.
    async fn requeue(&self, grading_job_uuid: Uuid, error: &str) -> Result<()>;

    /// Transition a job to failed after its retry budget is exhausted.
    async fn mark_failed(&self, grading_job_uuid: Uuid, error: &str) -> Result<()>;

    /// Revert every processing job whose `started_at` is older than the
    /// cutoff back to queued, recording the reason. Returns the reverted
    /// rows so in-memory processing markers can be cleared. Attempt counts
    /// are left untouched.
    async fn revert_stuck(
        &self,
        stuck_before: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<GradingJob>>;

    /// Administratively fail every queued and processing job. Returns the
    /// number of rows transitioned.
    async fn fail_all_active(&self, error: &str) -> Result<u64>;

    /// Delete completed/failed jobs finished before the cutoff. Returns the
    /// number of rows removed.
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Active (queued or processing) jobs for an owner, oldest first.
    async fn active_jobs_for_owner(&self, owner_uuid: Uuid) -> Result<Vec<GradingJob>>;
}

pub use memory::InMemoryJobStore;
pub use postgres::PgJobStore;
