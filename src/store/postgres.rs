//! # Postgres Job Store
//!
//! sqlx-backed [`JobStore`] over the `classmark_grading_jobs` table. Queries
//! use runtime binding rather than compile-time macros so the crate builds
//! without a live database; the row shape is pinned by [`GradingJobRow`].
//!
//! The store assumes a single active drain process (see the queue module), so
//! `next_queued` is a plain ordered select rather than a `FOR UPDATE SKIP
//! LOCKED` claim.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::error::{ClassmarkError, Result};
use crate::models::{GradingJob, JobStatus, NewGradingJob};
use crate::store::JobStore;

const JOB_COLUMNS: &str = "grading_job_uuid, submission_uuid, owner_uuid, priority, status, \
                           attempts, last_error, created_at, started_at, completed_at";

/// Postgres-backed job store.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn db_error(context: &str, e: sqlx::Error) -> ClassmarkError {
        error!("{context}: {e}");
        ClassmarkError::DatabaseError(format!("{context}: {e}"))
    }
}

/// Internal struct for SQL query results
#[derive(sqlx::FromRow)]
struct GradingJobRow {
    grading_job_uuid: Uuid,
    submission_uuid: Uuid,
    owner_uuid: Uuid,
    priority: i32,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<GradingJobRow> for GradingJob {
    type Error = ClassmarkError;

    fn try_from(row: GradingJobRow) -> Result<Self> {
        let status: JobStatus = row
            .status
            .parse()
            .map_err(ClassmarkError::InvalidStateError)?;
        Ok(GradingJob {
            grading_job_uuid: row.grading_job_uuid,
            submission_uuid: row.submission_uuid,
            owner_uuid: row.owner_uuid,
            priority: row.priority,
            status,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, new_job: NewGradingJob) -> Result<GradingJob> {
        let query = format!(
            r#"
            INSERT INTO classmark_grading_jobs
                (grading_job_uuid, submission_uuid, owner_uuid, priority, status, attempts, created_at)
            VALUES ($1, $2, $3, $4, 'queued', 0, NOW())
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, GradingJobRow>(&query)
            .bind(Uuid::new_v4())
            .bind(new_job.submission_uuid)
            .bind(new_job.owner_uuid)
            .bind(new_job.priority)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::db_error("Failed to insert grading job", e))?;

        row.try_into()
    }

    async fn find_latest_by_submission(
        &self,
        submission_uuid: Uuid,
    ) -> Result<Option<GradingJob>> {
        let query = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM classmark_grading_jobs
            WHERE submission_uuid = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );

        let row = sqlx::query_as::<_, GradingJobRow>(&query)
            .bind(submission_uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_error("Failed to look up grading job by submission", e))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM classmark_grading_jobs WHERE status = $1",
        )
        .bind(status.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::db_error("Failed to count grading jobs", e))?;

        Ok(count)
    }

    async fn next_queued(&self) -> Result<Option<GradingJob>> {
        let query = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM classmark_grading_jobs
            WHERE status = 'queued'
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#
        );

        let row = sqlx::query_as::<_, GradingJobRow>(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_error("Failed to fetch next queued grading job", e))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn queued_ahead_of(&self, job: &GradingJob) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM classmark_grading_jobs
            WHERE status = 'queued' AND created_at < $1
            "#,
        )
        .bind(job.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::db_error("Failed to count queued jobs ahead", e))?;

        Ok(count)
    }

    async fn mark_processing(&self, grading_job_uuid: Uuid) -> Result<GradingJob> {
        let query = format!(
            r#"
            UPDATE classmark_grading_jobs
            SET status = 'processing', attempts = attempts + 1, started_at = NOW()
            WHERE grading_job_uuid = $1
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, GradingJobRow>(&query)
            .bind(grading_job_uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_error("Failed to mark grading job processing", e))?
            .ok_or_else(|| {
                ClassmarkError::InvalidStateError(format!(
                    "Grading job {grading_job_uuid} not found"
                ))
            })?;

        row.try_into()
    }

    async fn mark_completed(&self, grading_job_uuid: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE classmark_grading_jobs
            SET status = 'completed', completed_at = NOW()
            WHERE grading_job_uuid = $1
            "#,
        )
        .bind(grading_job_uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_error("Failed to mark grading job completed", e))?;

        Ok(())
    }

    async fn requeue(&self, grading_job_uuid: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE classmark_grading_jobs
            SET status = 'queued', last_error = $2, started_at = NULL
            WHERE grading_job_uuid = $1
            "#,
        )
        .bind(grading_job_uuid)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_error("Failed to requeue grading job", e))?;

        Ok(())
    }

    async fn mark_failed(&self, grading_job_uuid: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE classmark_grading_jobs
            SET status = 'failed', last_error = $2, completed_at = NOW()
            WHERE grading_job_uuid = $1
            "#,
        )
        .bind(grading_job_uuid)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_error("Failed to mark grading job failed", e))?;

        Ok(())
    }

    async fn revert_stuck(
        &self,
        stuck_before: DateTime<Utc>,
        error_message: &str,
    ) -> Result<Vec<GradingJob>> {
        let query = format!(
            r#"
            UPDATE classmark_grading_jobs
            SET status = 'queued', last_error = $2, started_at = NULL
            WHERE status = 'processing' AND started_at < $1
            RETURNING {JOB_COLUMNS}
            "#
        );

        let rows = sqlx::query_as::<_, GradingJobRow>(&query)
            .bind(stuck_before)
            .bind(error_message)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_error("Failed to revert stuck grading jobs", e))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn fail_all_active(&self, error_message: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE classmark_grading_jobs
            SET status = 'failed', last_error = $1, completed_at = NOW()
            WHERE status IN ('queued', 'processing')
            "#,
        )
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_error("Failed to cancel active grading jobs", e))?;

        Ok(result.rows_affected())
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM classmark_grading_jobs
            WHERE status IN ('completed', 'failed') AND completed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_error("Failed to delete finished grading jobs", e))?;

        Ok(result.rows_affected())
    }

    async fn active_jobs_for_owner(&self, owner_uuid: Uuid) -> Result<Vec<GradingJob>> {
        let query = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM classmark_grading_jobs
            WHERE owner_uuid = $1 AND status IN ('queued', 'processing')
            ORDER BY created_at ASC
            "#
        );

        let rows = sqlx::query_as::<_, GradingJobRow>(&query)
            .bind(owner_uuid)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_error("Failed to list active grading jobs for owner", e))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
