//! # Notifier Port
//!
//! Owner-facing notifications for deferred grading outcomes. Emitted once per
//! job on completion and once on terminal failure; the immediate admission
//! path returns its result synchronously and does not notify.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Notification payload with a human-readable message and a deep link into
/// the platform UI.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingNotification {
    pub owner_uuid: Uuid,
    pub submission_uuid: Uuid,
    pub message: String,
    pub link: String,
}

impl GradingNotification {
    pub fn completed(owner_uuid: Uuid, submission_uuid: Uuid, subject_title: &str) -> Self {
        Self {
            owner_uuid,
            submission_uuid,
            message: format!("\"{subject_title}\" has been graded and is ready to review."),
            link: format!("/submissions/{submission_uuid}/results"),
        }
    }

    pub fn failed(owner_uuid: Uuid, submission_uuid: Uuid, subject_title: Option<&str>) -> Self {
        let message = match subject_title {
            Some(title) => format!(
                "Automatic grading for \"{title}\" did not succeed. The submission has been sent for manual grading."
            ),
            None => "Automatic grading did not succeed. The submission has been sent for manual grading.".to_string(),
        };
        Self {
            owner_uuid,
            submission_uuid,
            message,
            link: format!("/submissions/{submission_uuid}"),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn grading_completed(&self, notification: &GradingNotification) -> Result<()>;

    async fn grading_failed(&self, notification: &GradingNotification) -> Result<()>;
}
