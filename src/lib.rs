#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Classmark Core Rust
//!
//! High-performance Rust core for the Classmark education platform's
//! AI-assisted grading pipeline.
//!
//! ## Overview
//!
//! Classmark Core Rust implements the admission-controlled grading queue that
//! sits between the platform's request handlers and the rate-limited external
//! AI grading service. It decides per request whether to grade immediately or
//! defer, durably queues overflow work, drains it in the background as rate
//! budget frees up, and recovers from partial failures (crashed drains, stuck
//! jobs, exhausted retries).
//!
//! ## Architecture
//!
//! The crate is built around a single long-lived [`GradingQueueCore`] wired
//! with the platform's collaborators at process start:
//!
//! - [`store::JobStore`] — the durable queue table (Postgres in production,
//!   in-memory for tests and development)
//! - [`services::AnswerGrader`] — the external AI grading call
//! - [`services::SubmissionGateway`] — the platform's submission records
//! - [`services::Notifier`] — owner-facing notifications
//!
//! ## Key Features
//!
//! - **Sliding-Window Admission**: process-wide call budget against the
//!   grading provider's rolling quota
//! - **Durable Overflow Queue**: priority/age ordered, idempotent per
//!   submission, with caller-facing positions and ETAs
//! - **Single-Flight Draining**: one background drain per process with
//!   bounded retries and pacing
//! - **Self-Healing**: stuck-job and stuck-lock recovery on every trigger
//! - **Lifecycle Events**: broadcast stream of queue transitions for
//!   dashboards and audit trails
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use classmark_core::config::GradingQueueConfig;
//! use classmark_core::queue::{GradingQueueCore, GradingJobRequest, PeriodicDriver};
//! use classmark_core::store::InMemoryJobStore;
//! # use classmark_core::services::{AnswerGrader, SubmissionGateway, Notifier};
//!
//! # async fn example(
//! #     grader: Arc<dyn AnswerGrader>,
//! #     submissions: Arc<dyn SubmissionGateway>,
//! #     notifier: Arc<dyn Notifier>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = GradingQueueConfig::from_env()?;
//! let store = Arc::new(InMemoryJobStore::new());
//! let core = GradingQueueCore::new(config, store, grader, submissions, notifier);
//!
//! let driver = PeriodicDriver::new(Arc::clone(&core));
//! driver.start()?;
//!
//! let outcome = core
//!     .submit_or_queue(GradingJobRequest::new(
//!         uuid::Uuid::new_v4(),
//!         uuid::Uuid::new_v4(),
//!     ))
//!     .await?;
//! println!("Admission outcome: {outcome:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`queue`] - Admission, draining, status reporting, periodic driver
//! - [`resilience`] - Sliding-window rate limiting
//! - [`store`] - Durable queue store trait and implementations
//! - [`services`] - Ports to the grader, submissions, and notifications
//! - [`models`] - Grading job rows and status state machine
//! - [`events`] - Lifecycle event publishing
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging initialization

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod queue;
pub mod resilience;
pub mod services;
pub mod store;

pub use config::GradingQueueConfig;
pub use error::{ClassmarkError, Result};
pub use events::{EventPublisher, PublishedEvent};
pub use models::{GradingJob, JobStatus, NewGradingJob};
pub use queue::{
    AdmissionOutcome, GradingJobRequest, GradingQueueCore, JobProgress, OwnedJobStatus,
    PeriodicDriver,
};
pub use resilience::{RateLimiterStatus, SlidingWindowRateLimiter};
pub use services::{
    AnswerGrader, AnswerKind, AnswerToGrade, GradedAnswer, GraderError, GradingNotification,
    GradingRequest, GradingResponse, GradingStrictness, Notifier, SubmissionGateway,
};
pub use store::{InMemoryJobStore, JobStore, PgJobStore};
