//! # Submission Gateway Port
//!
//! Bridge between the grading queue and the platform's submission records.
//! The gateway assembles the graded-answer payload for a submission, applies
//! grading results transactionally, and flags submissions that exhausted
//! their retry budget for manual grading.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::services::grader::{GradingRequest, GradingResponse};

#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// Assemble the full graded-answer payload for a submission.
    ///
    /// Called immediately before the external grading call, so the payload
    /// reflects the submission's current answers even if the job sat queued.
    async fn load_grading_request(&self, submission_uuid: Uuid) -> Result<GradingRequest>;

    /// Apply per-answer results and the aggregate score/feedback to the
    /// submission record, and transition it to its graded state.
    ///
    /// Implementations must apply everything in a single transaction; a
    /// half-applied grading result is worse than a retried one.
    async fn apply_graded_results(
        &self,
        submission_uuid: Uuid,
        response: &GradingResponse,
    ) -> Result<()>;

    /// Transition the submission to its needs-manual-grading state after the
    /// retry budget is exhausted.
    async fn mark_needs_manual_grading(&self, submission_uuid: Uuid, reason: &str) -> Result<()>;
}
