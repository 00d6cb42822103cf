//! # Grading Job Model
//!
//! Queue row for one deferred AI grading request.
//!
//! ## Overview
//!
//! A `GradingJob` is created whenever a grading request cannot (or should not)
//! be executed immediately against the external grading service. Each row
//! tracks which submission to grade, who asked for it, how urgently it should
//! drain, and how far through the retry budget it has come.
//!
//! ## Uniqueness
//!
//! At most one *active* (queued or processing) job may exist per submission.
//! Terminal rows linger until the retention sweep deletes them, so uniqueness
//! is enforced against the latest row for a submission, not against history.
//!
//! ## Lifecycle
//!
//! ```text
//! Queued --(picked up, attempts+1)--> Processing --(success)--> Completed
//! Processing --(failure, attempts < max)--> Queued
//! Processing --(failure, attempts >= max)--> Failed
//! Processing --(started_at older than stuck timeout)--> Queued   (sweep)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default priority for caller-initiated enqueues. Higher drains first.
pub const PRIORITY_NORMAL: i32 = 0;

/// Processing state of a grading job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for the drain loop to pick it up
    Queued,
    /// Handed to the external grading service
    Processing,
    /// Graded and applied to the submission record
    Completed,
    /// Retry budget exhausted; submission needs manual grading
    Failed,
}

impl JobStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this job still occupies the queue (queued or processing)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Queued
    }
}

/// One unit of deferred grading work.
///
/// Maps to the `classmark_grading_jobs` table:
/// ```sql
/// CREATE TABLE classmark_grading_jobs (
///   grading_job_uuid UUID PRIMARY KEY,
///   submission_uuid UUID NOT NULL,
///   owner_uuid UUID NOT NULL,
///   priority INTEGER NOT NULL DEFAULT 0,
///   status VARCHAR(16) NOT NULL DEFAULT 'queued',
///   attempts INTEGER NOT NULL DEFAULT 0,
///   last_error TEXT,
///   created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///   started_at TIMESTAMPTZ,
///   completed_at TIMESTAMPTZ
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingJob {
    pub grading_job_uuid: Uuid,
    pub submission_uuid: Uuid,
    pub owner_uuid: Uuid,
    pub priority: i32,
    pub status: JobStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GradingJob {
    /// Check whether this processing job has been running past the threshold.
    ///
    /// Jobs without `started_at` are never considered stuck; the invariant is
    /// that processing rows always carry one, but a row violating it should be
    /// left for the sweep's bulk query rather than judged here.
    pub fn is_stuck(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.status == JobStatus::Processing
            && self
                .started_at
                .map(|started| now - started > threshold)
                .unwrap_or(false)
    }
}

/// New grading job for insertion (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGradingJob {
    pub submission_uuid: Uuid,
    pub owner_uuid: Uuid,
    pub priority: i32,
}

impl NewGradingJob {
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
