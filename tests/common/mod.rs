//! Shared fixtures for grading queue integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use classmark_core::config::GradingQueueConfig;
use classmark_core::error::Result;
use classmark_core::queue::GradingQueueCore;
use classmark_core::services::{
    AnswerGrader, AnswerKind, AnswerToGrade, GradedAnswer, GraderError, GradingNotification,
    GradingRequest, GradingResponse, GradingStrictness, Notifier, SubmissionGateway,
};
use classmark_core::store::InMemoryJobStore;

/// Behavior of the mock grading service for the current test.
#[derive(Clone)]
pub enum GraderMode {
    /// Full marks for every answer
    Succeed,
    /// Uniform transport failure
    Fail,
    /// Park each call until the test releases it via the notify handle
    Block(Arc<Notify>),
}

pub struct MockGrader {
    mode: Mutex<GraderMode>,
    pub calls: AtomicUsize,
}

impl MockGrader {
    pub fn new(mode: GraderMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: GraderMode) {
        *self.mode.lock() = mode;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn full_marks(request: &GradingRequest) -> GradingResponse {
        let answers: Vec<GradedAnswer> = request
            .answers
            .iter()
            .map(|answer| GradedAnswer {
                answer_uuid: answer.answer_uuid,
                is_correct: true,
                points_awarded: answer.max_points,
                feedback: "Correct.".to_string(),
            })
            .collect();
        let total = request.total_possible();
        GradingResponse {
            answers,
            overall_feedback: "Well done.".to_string(),
            total_score: total,
            total_possible: total,
        }
    }
}

#[async_trait]
impl AnswerGrader for MockGrader {
    async fn grade(&self, request: &GradingRequest) -> std::result::Result<GradingResponse, GraderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = self.mode.lock().clone();
        match mode {
            GraderMode::Succeed => Ok(Self::full_marks(request)),
            GraderMode::Fail => Err(GraderError::Transport(
                "mock grading service unavailable".to_string(),
            )),
            GraderMode::Block(gate) => {
                gate.notified().await;
                Ok(Self::full_marks(request))
            }
        }
    }
}

/// Gateway that serves a canned payload and records every callback.
#[derive(Default)]
pub struct RecordingGateway {
    pub loaded: Mutex<Vec<Uuid>>,
    pub applied: Mutex<Vec<(Uuid, GradingResponse)>>,
    pub manual: Mutex<Vec<(Uuid, String)>>,
}

#[async_trait]
impl SubmissionGateway for RecordingGateway {
    async fn load_grading_request(&self, submission_uuid: Uuid) -> Result<GradingRequest> {
        self.loaded.lock().push(submission_uuid);
        Ok(GradingRequest {
            submission_uuid,
            subject_title: "Algebra Quiz".to_string(),
            answers: vec![AnswerToGrade {
                answer_uuid: Uuid::new_v4(),
                question_text: "Solve 3x = 12".to_string(),
                reference_answer: "x = 4".to_string(),
                submitted_answer: "x = 4".to_string(),
                answer_kind: AnswerKind::ShortAnswer,
                max_points: 5.0,
            }],
            strictness: GradingStrictness::Standard,
            allow_partial_credit: true,
        })
    }

    async fn apply_graded_results(
        &self,
        submission_uuid: Uuid,
        response: &GradingResponse,
    ) -> Result<()> {
        self.applied.lock().push((submission_uuid, response.clone()));
        Ok(())
    }

    async fn mark_needs_manual_grading(&self, submission_uuid: Uuid, reason: &str) -> Result<()> {
        self.manual.lock().push((submission_uuid, reason.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub completed: Mutex<Vec<GradingNotification>>,
    pub failed: Mutex<Vec<GradingNotification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn grading_completed(&self, notification: &GradingNotification) -> Result<()> {
        self.completed.lock().push(notification.clone());
        Ok(())
    }

    async fn grading_failed(&self, notification: &GradingNotification) -> Result<()> {
        self.failed.lock().push(notification.clone());
        Ok(())
    }
}

pub struct TestHarness {
    pub core: Arc<GradingQueueCore>,
    pub store: Arc<InMemoryJobStore>,
    pub grader: Arc<MockGrader>,
    pub gateway: Arc<RecordingGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness(config: GradingQueueConfig, mode: GraderMode) -> TestHarness {
    let store = Arc::new(InMemoryJobStore::new());
    let grader = Arc::new(MockGrader::new(mode));
    let gateway = Arc::new(RecordingGateway::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let core = GradingQueueCore::new(
        config,
        Arc::clone(&store) as Arc<dyn classmark_core::store::JobStore>,
        Arc::clone(&grader) as Arc<dyn AnswerGrader>,
        Arc::clone(&gateway) as Arc<dyn SubmissionGateway>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    );

    TestHarness {
        core,
        store,
        grader,
        gateway,
        notifier,
    }
}

/// Config with the limiter effectively disabled, forcing the queue path.
pub fn queue_only_config() -> GradingQueueConfig {
    GradingQueueConfig {
        rate_limit_max_calls: 0,
        ..GradingQueueConfig::default()
    }
}
