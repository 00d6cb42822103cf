//! # Admission-Controlled Grading Queue
//!
//! Process-wide orchestration of calls to the external AI grading service.
//!
//! ## Overview
//!
//! The grading provider meters calls to a rolling per-minute quota, while the
//! platform produces grading requests in bursts (a class submitting a test
//! ends with dozens of submissions arriving inside a few seconds). This
//! module decides, per request, whether to grade immediately or to queue,
//! then drains the queue in the background as budget frees up.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │ Request      │──▶│ Admission        │──▶│ AI Grading    │
//! │ Handler      │   │ (limiter check)  │   │ Service       │
//! └──────────────┘   └────────┬─────────┘   └───────▲───────┘
//!                             │ over budget          │
//!                             ▼                      │
//!                    ┌──────────────────┐   ┌────────┴──────┐
//!                    │ Job Store        │──▶│ Drain Loop    │
//!                    │ (durable queue)  │   │ (single-flight)│
//!                    └──────────────────┘   └───────────────┘
//! ```
//!
//! ## Components
//!
//! - [`GradingQueueCore`] — the single long-lived service object holding the
//!   limiter, drain lock, in-flight markers, and wired ports
//! - [`admission`] — immediate-or-queued decision per request
//! - [`drain`] — the background loop with retry and stuck recovery
//! - [`status`] — caller-facing queue positions and ETAs
//! - [`driver`] — the periodic trigger and retention sweep

pub mod admission;
pub mod core;
pub mod drain;
pub mod driver;
pub mod status;

pub use admission::{AdmissionOutcome, GradingJobRequest};
pub use self::core::GradingQueueCore;
pub use driver::PeriodicDriver;
pub use status::{JobProgress, OwnedJobStatus};
