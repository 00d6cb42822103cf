//! # Answer Grader Port
//!
//! Typed interface to the external AI grading service.
//!
//! ## Overview
//!
//! The grading service receives a whole submission — every answer with its
//! question, reference answer, and point budget — and returns per-answer
//! verdicts plus aggregate feedback in a single call. The call is metered by
//! the provider, which is why the queue core rations it through the
//! sliding-window limiter.
//!
//! ## Failure semantics
//!
//! Any [`GraderError`] is retryable from the queue's point of view: transport
//! faults, provider rejections, and malformed payloads are handled uniformly
//! by the requeue-with-retry policy. The port makes no attempt to distinguish
//! permanent from transient provider failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How literally the grader should compare submitted answers to references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingStrictness {
    /// Accept paraphrases and partially matching reasoning
    Lenient,
    /// Balanced comparison, the platform default
    Standard,
    /// Require close correspondence with the reference answer
    Strict,
}

impl Default for GradingStrictness {
    fn default() -> Self {
        Self::Standard
    }
}

/// Kind of answer being graded, which shapes the grading rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    MultipleChoice,
    ShortAnswer,
    Essay,
    Numeric,
}

/// One answer within a grading request, in presentation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerToGrade {
    pub answer_uuid: Uuid,
    pub question_text: String,
    pub reference_answer: String,
    pub submitted_answer: String,
    pub answer_kind: AnswerKind,
    pub max_points: f64,
}

/// Full graded-answer payload for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingRequest {
    pub submission_uuid: Uuid,
    pub subject_title: String,
    pub answers: Vec<AnswerToGrade>,
    pub strictness: GradingStrictness,
    pub allow_partial_credit: bool,
}

impl GradingRequest {
    /// Total points available across all answers.
    pub fn total_possible(&self) -> f64 {
        self.answers.iter().map(|a| a.max_points).sum()
    }
}

/// Per-answer verdict from the grading service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub answer_uuid: Uuid,
    pub is_correct: bool,
    pub points_awarded: f64,
    pub feedback: String,
}

impl GradedAnswer {
    /// Clamp awarded points into `[0, max_points]`.
    ///
    /// The provider contract says points arrive clamped, but a model-generated
    /// number outside the budget must not corrupt score totals.
    pub fn clamp_points(&mut self, max_points: f64) {
        self.points_awarded = self.points_awarded.clamp(0.0, max_points);
    }
}

/// Aggregate grading result for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResponse {
    pub answers: Vec<GradedAnswer>,
    pub overall_feedback: String,
    pub total_score: f64,
    pub total_possible: f64,
}

/// Errors surfaced by grader implementations. All of them are retryable.
#[derive(Debug, thiserror::Error)]
pub enum GraderError {
    #[error("Transport failure calling grading service: {0}")]
    Transport(String),

    #[error("Grading service rejected the request: {0}")]
    Rejected(String),

    #[error("Malformed grading response: {0}")]
    InvalidResponse(String),
}

/// External AI grading call.
///
/// Implementations own the HTTP client, authentication, prompt construction,
/// and response validation. The queue core only sees the typed payloads.
#[async_trait]
pub trait AnswerGrader: Send + Sync {
    async fn grade(&self, request: &GradingRequest) -> Result<GradingResponse, GraderError>;
}
