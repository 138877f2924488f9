//! Re-invocation driver.
//!
//! An invocation runs passes back to back inside a bounded window. When the
//! window closes with work left it asks the [`Scheduler`] for another
//! invocation; when a pass comes back empty it clears pending triggers and
//! reports [`DriverState::Done`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::DriverSettings;

use super::sweep::{PassReport, SweepPass};

/// Where the sweep stands after an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// More work remains; another invocation has been scheduled.
    Running,
    /// Nothing left to process.
    Done,
}

/// Arranges future invocations.
///
/// Scheduling replaces any pending trigger, so at most one is ever queued.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule_after(&self, delay: Duration);
    async fn clear_all(&self);
}

/// In-process scheduler backed by a single pending deadline.
#[derive(Debug, Default)]
pub struct LocalScheduler {
    pending: Mutex<Option<Instant>>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The queued trigger time, if any.
    pub fn pending(&self) -> Option<Instant> {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleeps until the queued trigger fires and consumes it.
    ///
    /// Returns `false` straight away when nothing is queued.
    pub async fn wait_for_trigger(&self) -> bool {
        let next = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take();
        match next {
            Some(at) => {
                tokio::time::sleep_until(at).await;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Scheduler for LocalScheduler {
    async fn schedule_after(&self, delay: Duration) {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now() + delay);
    }

    async fn clear_all(&self) {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Runs passes within one invocation window and decides what happens next.
pub struct InvocationDriver<P: SweepPass + ?Sized, S: Scheduler + ?Sized> {
    sweep: Arc<P>,
    scheduler: Arc<S>,
    settings: DriverSettings,
}

impl<P: SweepPass + ?Sized, S: Scheduler + ?Sized> InvocationDriver<P, S> {
    pub fn new(sweep: Arc<P>, scheduler: Arc<S>, settings: DriverSettings) -> Self {
        Self {
            sweep,
            scheduler,
            settings,
        }
    }

    /// One invocation.
    ///
    /// A failed pass is logged and retried after the error delay rather than
    /// surfaced; the caller only ever sees the resulting state.
    pub async fn invoke(&self) -> DriverState {
        let deadline = Instant::now() + self.settings.effective_window();
        let mut totals = PassReport::default();
        let mut passes = 0usize;

        while Instant::now() < deadline {
            let report = match self.sweep.run_pass(deadline).await {
                Ok(report) => report,
                Err(e) => {
                    let delay = self.settings.error_retry_delay();
                    tracing::error!(
                        error = %e,
                        transient = e.is_transient(),
                        delay_ms = delay.as_millis() as u64,
                        "pass failed, scheduling retry"
                    );
                    self.scheduler.schedule_after(delay).await;
                    return DriverState::Running;
                }
            };

            passes += 1;
            totals.processed += report.processed;
            totals.sent_to_classifier += report.sent_to_classifier;
            totals.labeled_rejections += report.labeled_rejections;
            tracing::info!(
                pass = passes,
                processed = totals.processed,
                labeled = totals.labeled_rejections,
                "invocation progress"
            );

            if report.is_final() {
                tracing::info!(
                    passes,
                    processed = totals.processed,
                    "all emails scanned, clearing triggers"
                );
                self.scheduler.clear_all().await;
                return DriverState::Done;
            }

            let pacing = self.settings.pass_pacing();
            if Instant::now() + pacing >= deadline {
                break;
            }
            tokio::time::sleep(pacing).await;
        }

        let delay = self.settings.reinvoke_delay();
        tracing::info!(
            passes,
            processed = totals.processed,
            delay_ms = delay.as_millis() as u64,
            "time window closing, scheduling next run"
        );
        self.scheduler.schedule_after(delay).await;
        DriverState::Running
    }
}

/// Keeps invoking until the sweep is done or nothing is scheduled.
pub async fn run_until_done<P: SweepPass + ?Sized>(
    driver: &InvocationDriver<P, LocalScheduler>,
) -> DriverState {
    loop {
        let state = driver.invoke().await;
        if state == DriverState::Done {
            return state;
        }
        if !driver.scheduler.wait_for_trigger().await {
            return state;
        }
    }
}
