//! # External Service Ports
//!
//! Traits for the collaborators the grading queue calls into but does not
//! own: the AI grading service, the submission domain records, and the
//! notification subsystem. The platform's request handlers wire concrete
//! implementations in at process start; tests substitute mocks.

pub mod grader;
pub mod notifications;
pub mod submissions;

pub use grader::{
    AnswerGrader, AnswerKind, AnswerToGrade, GradedAnswer, GraderError, GradingRequest,
    GradingResponse, GradingStrictness,
};
pub use notifications::{GradingNotification, Notifier};
pub use submissions::SubmissionGateway;
