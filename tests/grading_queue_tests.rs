//! Integration tests for the admission-controlled grading queue.
//!
//! Every test runs on the paused tokio clock against the in-memory store and
//! mock ports, so window expiry, throttle sleeps, and the periodic driver all
//! execute deterministically.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use uuid::Uuid;

use classmark_core::config::GradingQueueConfig;
use classmark_core::models::{JobStatus, NewGradingJob};
use classmark_core::queue::{AdmissionOutcome, GradingJobRequest, JobProgress, PeriodicDriver};
use classmark_core::store::JobStore;

use common::{harness, queue_only_config, GraderMode};

fn request(submission: Uuid) -> GradingJobRequest {
    GradingJobRequest::new(submission, Uuid::new_v4())
}

#[tokio::test(start_paused = true)]
async fn test_rate_cap_example_scenario() {
    // window=60000ms, cap=3: five prompt submissions, grader always succeeds
    let config = GradingQueueConfig {
        rate_limit_max_calls: 3,
        ..GradingQueueConfig::default()
    };
    let h = harness(config, GraderMode::Succeed);
    let owner = Uuid::new_v4();

    let submissions: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    let mut outcomes = Vec::new();
    for submission in &submissions {
        outcomes.push(
            h.core
                .submit_or_queue(GradingJobRequest::new(*submission, owner))
                .await
                .unwrap(),
        );
    }

    // Calls 1-3 execute immediately
    for outcome in &outcomes[..3] {
        assert!(matches!(outcome, AdmissionOutcome::Graded { .. }));
    }
    assert_eq!(h.grader.call_count(), 3);

    // Calls 4-5 are queued at positions 1 and 2
    assert!(matches!(
        outcomes[3],
        AdmissionOutcome::Queued { position: 1, .. }
    ));
    assert!(matches!(
        outcomes[4],
        AdmissionOutcome::Queued { position: 2, .. }
    ));

    // Past the window, the background drain completes both queued items
    tokio::time::sleep(Duration::from_secs(120)).await;

    for submission in &submissions[3..] {
        assert_eq!(
            h.core.position_of(*submission).await.unwrap(),
            JobProgress::Completed
        );
    }
    // Immediate-path grades never had a queue row to begin with
    for submission in &submissions[..3] {
        assert_eq!(
            h.core.position_of(*submission).await.unwrap(),
            JobProgress::NotQueued
        );
    }
    assert_eq!(h.grader.call_count(), 5);
    assert_eq!(h.gateway.applied.lock().len(), 5);
    // Notifications go out for deferred completions only
    assert_eq!(h.notifier.completed.lock().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_queued_eta_arithmetic() {
    let h = harness(queue_only_config(), GraderMode::Succeed);

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let first_outcome = h.core.submit_or_queue(request(first)).await.unwrap();
    let second_outcome = h.core.submit_or_queue(request(second)).await.unwrap();

    // Nothing is processing, so ETA is pure position math at 4s per item
    assert!(matches!(
        first_outcome,
        AdmissionOutcome::Queued {
            position: 1,
            eta_seconds: 4
        }
    ));
    assert!(matches!(
        second_outcome,
        AdmissionOutcome::Queued {
            position: 2,
            eta_seconds: 8
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_enqueue_is_idempotent() {
    let h = harness(queue_only_config(), GraderMode::Succeed);
    let submission = Uuid::new_v4();

    let first = h.core.submit_or_queue(request(submission)).await.unwrap();
    let second = h.core.submit_or_queue(request(submission)).await.unwrap();

    assert!(matches!(
        first,
        AdmissionOutcome::Queued { position: 1, .. }
    ));
    assert!(matches!(
        second,
        AdmissionOutcome::Queued { position: 1, .. }
    ));
    assert_eq!(
        h.store.count_by_status(JobStatus::Queued).await.unwrap(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_positions_are_monotonic_by_creation() {
    let h = harness(queue_only_config(), GraderMode::Succeed);

    let submissions: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    for (i, submission) in submissions.iter().enumerate() {
        let outcome = h.core.submit_or_queue(request(*submission)).await.unwrap();
        match outcome {
            AdmissionOutcome::Queued { position, .. } => {
                assert_eq!(position, i as i64 + 1);
            }
            AdmissionOutcome::Graded { .. } => panic!("limiter is disabled in this test"),
        }
    }

    // Polling reports the same ordering
    for (i, submission) in submissions.iter().enumerate() {
        match h.core.position_of(*submission).await.unwrap() {
            JobProgress::Queued { position, .. } => assert_eq!(position, i as i64 + 1),
            other => panic!("expected queued progress, got {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_immediate_failure_falls_back_to_queue_and_exhausts_retries() {
    // maxAttempts=3, grader fails every time
    let h = harness(GradingQueueConfig::default(), GraderMode::Fail);
    let submission = Uuid::new_v4();

    let outcome = h.core.submit_or_queue(request(submission)).await.unwrap();

    // The caller sees a queue position, never the grader error
    assert!(matches!(
        outcome,
        AdmissionOutcome::Queued { position: 1, .. }
    ));
    let job = h
        .store
        .find_latest_by_submission(submission)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.priority, 10); // elevated so it does not starve

    // Let the background drain burn through the retry budget
    tokio::time::sleep(Duration::from_secs(60)).await;

    let job = h
        .store
        .find_latest_by_submission(submission)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert!(job.last_error.is_some());

    // 1 immediate attempt + 3 drain attempts
    assert_eq!(h.grader.call_count(), 4);
    assert_eq!(h.notifier.failed.lock().len(), 1);
    assert_eq!(h.gateway.manual.lock().len(), 1);
    assert!(matches!(
        h.core.position_of(submission).await.unwrap(),
        JobProgress::Failed { error: Some(_) }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_is_exactly_max_attempts() {
    let h = harness(GradingQueueConfig::default(), GraderMode::Fail);
    let submission = Uuid::new_v4();
    let job = h
        .store
        .insert(NewGradingJob::new(submission, Uuid::new_v4()))
        .await
        .unwrap();

    h.core.drain().await.unwrap();

    let job = h.store.get(job.grading_job_uuid).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert_eq!(h.grader.call_count(), 3);
    assert_eq!(h.notifier.failed.lock().len(), 1);

    // A failed job is terminal: another drain never touches it
    h.core.drain().await.unwrap();
    assert_eq!(h.grader.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_job_is_recovered_by_next_drain() {
    let h = harness(GradingQueueConfig::default(), GraderMode::Succeed);
    let submission = Uuid::new_v4();
    let job = h
        .store
        .insert(NewGradingJob::new(submission, Uuid::new_v4()))
        .await
        .unwrap();

    // Simulate a crash mid-processing: attempts consumed, started_at stale
    h.store.mark_processing(job.grading_job_uuid).await.unwrap();
    h.store
        .set_started_at(
            job.grading_job_uuid,
            Some(chrono::Utc::now() - chrono::Duration::minutes(10)),
        )
        .await
        .unwrap();

    h.core.drain().await.unwrap();

    // The sweep reverted it (attempts untouched), then the loop graded it
    let job = h.store.get(job.grading_job_uuid).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 2);
    assert_eq!(h.notifier.completed.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_drain_is_a_noop() {
    let h = harness(GradingQueueConfig::default(), GraderMode::Succeed);
    let gate = Arc::new(Notify::new());
    h.grader.set_mode(GraderMode::Block(Arc::clone(&gate)));

    let submission = Uuid::new_v4();
    h.store
        .insert(NewGradingJob::new(submission, Uuid::new_v4()))
        .await
        .unwrap();

    let core = Arc::clone(&h.core);
    let drain_task = tokio::spawn(async move { core.drain().await });

    // Wait until the first drain is parked inside the grading call
    while h.grader.call_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // A second drain while the lock is held must not dequeue anything
    h.core.drain().await.unwrap();
    assert_eq!(h.grader.call_count(), 1);

    gate.notify_one();
    drain_task.await.unwrap().unwrap();

    assert_eq!(h.grader.call_count(), 1);
    assert_eq!(
        h.core.position_of(submission).await.unwrap(),
        JobProgress::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_jobs_fails_active_rows() {
    let h = harness(queue_only_config(), GraderMode::Succeed);

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    h.core.submit_or_queue(request(first)).await.unwrap();
    h.core.submit_or_queue(request(second)).await.unwrap();

    let cancelled = h.core.cancel_all_jobs("maintenance window").await.unwrap();
    assert_eq!(cancelled, 2);

    for submission in [first, second] {
        match h.core.position_of(submission).await.unwrap() {
            JobProgress::Failed { error } => {
                assert_eq!(error.as_deref(), Some("maintenance window"));
            }
            other => panic!("expected failed progress, got {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_periodic_driver_lifecycle() {
    let h = harness(GradingQueueConfig::default(), GraderMode::Succeed);
    let submission = Uuid::new_v4();
    h.store
        .insert(NewGradingJob::new(submission, Uuid::new_v4()))
        .await
        .unwrap();

    let driver = PeriodicDriver::new(Arc::clone(&h.core));
    driver.start().unwrap();
    assert!(driver.is_running());
    assert!(driver.start().is_err());

    // The driver drains once immediately on start
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        h.core.position_of(submission).await.unwrap(),
        JobProgress::Completed
    );

    // Work queued later is picked up by the tick without an explicit trigger
    let late = Uuid::new_v4();
    h.store
        .insert(NewGradingJob::new(late, Uuid::new_v4()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
        h.core.position_of(late).await.unwrap(),
        JobProgress::Completed
    );

    driver.stop().await;
    assert!(!driver.is_running());

    driver.restart().await.unwrap();
    assert!(driver.is_running());
    driver.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_halt_all_stops_driver_and_cancels_queue() {
    let h = harness(queue_only_config(), GraderMode::Succeed);
    let driver = PeriodicDriver::new(Arc::clone(&h.core));

    h.core.submit_or_queue(request(Uuid::new_v4())).await.unwrap();
    h.core.submit_or_queue(request(Uuid::new_v4())).await.unwrap();

    let cancelled = driver.halt_all("disable AI grading").await.unwrap();
    assert_eq!(cancelled, 2);
    assert!(!driver.is_running());
    assert_eq!(
        h.store.count_by_status(JobStatus::Failed).await.unwrap(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn test_retention_sweep_removes_old_finished_rows() {
    let config = GradingQueueConfig {
        retention_period: Duration::ZERO,
        ..queue_only_config()
    };
    let h = harness(config, GraderMode::Succeed);

    let finished = h
        .store
        .insert(NewGradingJob::new(Uuid::new_v4(), Uuid::new_v4()))
        .await
        .unwrap();
    h.store.mark_processing(finished.grading_job_uuid).await.unwrap();
    h.store.mark_completed(finished.grading_job_uuid).await.unwrap();

    let still_queued = h
        .store
        .insert(NewGradingJob::new(Uuid::new_v4(), Uuid::new_v4()))
        .await
        .unwrap();

    let removed = h.core.run_retention_sweep().await.unwrap();
    assert_eq!(removed, 1);
    assert!(h.store.get(finished.grading_job_uuid).await.is_none());
    assert!(h.store.get(still_queued.grading_job_uuid).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_not_queued_is_distinct_from_completed() {
    let h = harness(queue_only_config(), GraderMode::Succeed);

    assert_eq!(
        h.core.position_of(Uuid::new_v4()).await.unwrap(),
        JobProgress::NotQueued
    );

    let job = h
        .store
        .insert(NewGradingJob::new(Uuid::new_v4(), Uuid::new_v4()))
        .await
        .unwrap();
    h.store.mark_processing(job.grading_job_uuid).await.unwrap();
    h.store.mark_completed(job.grading_job_uuid).await.unwrap();

    assert_eq!(
        h.core.position_of(job.submission_uuid).await.unwrap(),
        JobProgress::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_terminal_row_does_not_block_a_fresh_enqueue() {
    let h = harness(queue_only_config(), GraderMode::Succeed);
    let submission = Uuid::new_v4();

    let old = h
        .store
        .insert(NewGradingJob::new(submission, Uuid::new_v4()))
        .await
        .unwrap();
    h.store.mark_processing(old.grading_job_uuid).await.unwrap();
    h.store.mark_completed(old.grading_job_uuid).await.unwrap();

    // The completed row lingers until retention, but a re-grade still queues
    let outcome = h.core.submit_or_queue(request(submission)).await.unwrap();
    assert!(matches!(
        outcome,
        AdmissionOutcome::Queued { position: 1, .. }
    ));
    assert_eq!(
        h.store.count_by_status(JobStatus::Queued).await.unwrap(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_owner_batch_view_orders_by_creation() {
    let h = harness(queue_only_config(), GraderMode::Succeed);
    let owner = Uuid::new_v4();

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    h.core
        .submit_or_queue(GradingJobRequest::new(first, owner))
        .await
        .unwrap();
    h.core
        .submit_or_queue(GradingJobRequest::new(second, owner))
        .await
        .unwrap();
    // Someone else's work does not show up in this owner's view
    h.core.submit_or_queue(request(Uuid::new_v4())).await.unwrap();

    let statuses = h.core.active_jobs_for_owner(owner).await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].submission_uuid, first);
    assert_eq!(statuses[1].submission_uuid, second);
    assert!(matches!(
        statuses[0].progress,
        JobProgress::Queued { position: 1, .. }
    ));
    assert!(matches!(
        statuses[1].progress,
        JobProgress::Queued { position: 2, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_limiter_status_snapshot() {
    let config = GradingQueueConfig {
        rate_limit_max_calls: 2,
        ..GradingQueueConfig::default()
    };
    let h = harness(config, GraderMode::Succeed);

    h.core.submit_or_queue(request(Uuid::new_v4())).await.unwrap();
    h.core.submit_or_queue(request(Uuid::new_v4())).await.unwrap();

    let status = h.core.limiter_status();
    assert_eq!(status.current_calls, 2);
    assert_eq!(status.available_slots, 0);
    assert_eq!(status.next_slot_in_ms, Some(60_000));
}
