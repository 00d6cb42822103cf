//! # Data Models
//!
//! Row-level types for the grading queue. The only persisted entity the core
//! owns is [`GradingJob`]; submissions, answers, and users belong to the
//! surrounding platform and are reached through the service ports.

pub mod grading_job;

pub use grading_job::{GradingJob, JobStatus, NewGradingJob, PRIORITY_NORMAL};
