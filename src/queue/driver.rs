//! # Periodic Driver
//!
//! Ticking trigger for the drain loop. A 5-second tick re-invokes `drain()`
//! so that throttled work, retries, and recovered stuck rows make progress
//! even when no new enqueue arrives, and a much slower tick runs the
//! retention sweep. Stopping the driver is the first half of an
//! administrative halt; [`halt_all`](PeriodicDriver::halt_all) also cancels
//! every queued and processing job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{ClassmarkError, Result};
use crate::queue::core::GradingQueueCore;

/// Repeating timer that keeps the grading queue draining.
pub struct PeriodicDriver {
    core: Arc<GradingQueueCore>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicDriver {
    pub fn new(core: Arc<GradingQueueCore>) -> Self {
        Self {
            core,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Start ticking: one drain immediately, then every drain interval, with
    /// the retention sweep on its own slower interval.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ClassmarkError::InvalidStateError(
                "Periodic driver is already running".to_string(),
            ));
        }

        let core = Arc::clone(&self.core);
        let running = Arc::clone(&self.running);
        let shutdown = Arc::clone(&self.shutdown);

        let handle = tokio::spawn(async move {
            info!(
                drain_interval_ms = core.config.drain_interval.as_millis() as u64,
                "🔧 Periodic grading driver started"
            );

            if let Err(e) = core.drain().await {
                error!("❌ Initial drain failed: {e}");
            }

            let mut drain_tick = tokio::time::interval(core.config.drain_interval);
            let mut retention_tick = tokio::time::interval(core.config.retention_interval);
            // Both intervals fire immediately on creation; the immediate
            // drain has already happened, so consume the first ticks.
            drain_tick.tick().await;
            retention_tick.tick().await;

            while running.load(Ordering::Acquire) {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = drain_tick.tick() => {
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        if let Err(e) = core.drain().await {
                            error!("❌ Periodic drain failed: {e}");
                        }
                    }
                    _ = retention_tick.tick() => {
                        if let Err(e) = core.run_retention_sweep().await {
                            error!("❌ Retention sweep failed: {e}");
                        }
                    }
                }
            }

            info!("🏁 Periodic grading driver stopped");
        });

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop ticking and wait for the loop to wind down. Does not cancel
    /// queued jobs; see [`halt_all`](Self::halt_all).
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shutdown.notify_waiters();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("❌ Driver task join failed: {e}");
            }
        }
    }

    pub async fn restart(&self) -> Result<()> {
        self.stop().await;
        self.start()
    }

    /// Administrative halt of all background AI work: stop the driver so no
    /// new drain starts, then fail every queued and processing job. An
    /// external call already in flight is not aborted.
    pub async fn halt_all(&self, reason: &str) -> Result<u64> {
        self.stop().await;
        self.core.cancel_all_jobs(reason).await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
