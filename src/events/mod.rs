//! # Lifecycle Events
//!
//! Broadcast events for grading queue lifecycle transitions. Observers
//! (dashboards, audit log writers, WebSocket pushers) subscribe to the
//! publisher; the queue core publishes and never waits on consumers.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};

/// Event names published by the queue core.
pub mod topics {
    pub const JOB_QUEUED: &str = "grading.job.queued";
    pub const JOB_COMPLETED: &str = "grading.job.completed";
    pub const JOB_RETRIED: &str = "grading.job.retried";
    pub const JOB_FAILED: &str = "grading.job.failed";
    pub const QUEUE_CANCELLED: &str = "grading.queue.cancelled";
    pub const QUEUE_SWEPT: &str = "grading.queue.swept";
}
