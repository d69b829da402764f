//! # Sweep Monitor
//!
//! Background loop that runs a reconciliation sweep followed by a compensation
//! sweep, then waits for the configured interval.
//!
//! ## States
//!
//! ```text
//! Stopped → Running → Stopping → Stopped
//! ```
//!
//! - `start` while running is a logged no-op.
//! - Errors and panics inside a cycle are logged and the loop continues.
//! - `stop` cancels the wait between cycles; a cycle already in progress is
//!   allowed to finish, bounded by `stop_timeout`.

use crate::compensate::CompensationTask;
use crate::config::MonitorConfig;
use crate::error::{Result, SyncError};
use crate::reconcile::ReconciliationTask;
use crate::report::SweepOutcome;
use core_runtime::events::{CoreEvent, EventBus, MonitorEvent};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Lifecycle of the monitor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
    Stopping,
}

/// Results of one reconciliation + compensation cycle.
///
/// `None` means that sweep returned an error (already logged).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub reconcile: Option<SweepOutcome>,
    pub compensate: Option<SweepOutcome>,
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    state: MonitorState,
    worker: Option<Worker>,
}

/// Runs sweeps on a fixed interval until stopped
pub struct SweepMonitor {
    reconcile: Arc<ReconciliationTask>,
    compensate: Arc<CompensationTask>,
    events: Arc<EventBus>,
    config: MonitorConfig,
    inner: Mutex<Inner>,
}

impl SweepMonitor {
    pub fn new(
        reconcile: Arc<ReconciliationTask>,
        compensate: Arc<CompensationTask>,
        events: Arc<EventBus>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            reconcile,
            compensate,
            events,
            config,
            inner: Mutex::new(Inner {
                state: MonitorState::Stopped,
                worker: None,
            }),
        }
    }

    pub async fn state(&self) -> MonitorState {
        let mut inner = self.inner.lock().await;
        // A loop that ended on its own counts as stopped
        if inner.state == MonitorState::Running
            && inner.worker.as_ref().map(|w| w.handle.is_finished()).unwrap_or(true)
        {
            inner.state = MonitorState::Stopped;
            inner.worker = None;
        }
        inner.state
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == MonitorState::Running
    }

    /// Start the background loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        if self.is_running().await {
            info!("Monitor already running, ignoring start");
            return false;
        }

        let mut inner = self.inner.lock().await;
        if inner.state != MonitorState::Stopped {
            info!(state = ?inner.state, "Monitor busy, ignoring start");
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.reconcile.clone(),
            self.compensate.clone(),
            self.events.clone(),
            self.config,
            token.clone(),
        ));

        inner.worker = Some(Worker { token, handle });
        inner.state = MonitorState::Running;
        true
    }

    /// Signal the loop to stop and wait for the current cycle, bounded by
    /// `stop_timeout`.
    ///
    /// # Errors
    ///
    /// - `SyncError::NotRunning` if the monitor was not started
    /// - `SyncError::Timeout` if the cycle did not finish in time; the loop
    ///   still exits once that cycle ends
    pub async fn stop(&self) -> Result<()> {
        let worker = {
            let mut inner = self.inner.lock().await;
            let Some(worker) = inner.worker.take() else {
                inner.state = MonitorState::Stopped;
                return Err(SyncError::NotRunning);
            };
            inner.state = MonitorState::Stopping;
            worker
        };

        info!("Stopping monitor");
        worker.token.cancel();
        let mut handle = worker.handle;
        let result = tokio::time::timeout(self.config.stop_timeout, &mut handle).await;

        self.inner.lock().await.state = MonitorState::Stopped;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "Monitor task ended abnormally");
                Ok(())
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.stop_timeout.as_secs(),
                    "Current cycle still running after stop timeout"
                );
                Err(SyncError::Timeout(self.config.stop_timeout.as_secs()))
            }
        }
    }

    /// Run one cycle in the caller's task, outside the schedule.
    pub async fn run_cycle(&self) -> CycleOutcome {
        run_cycle(&self.reconcile, &self.compensate).await
    }
}

async fn run_cycle(reconcile: &ReconciliationTask, compensate: &CompensationTask) -> CycleOutcome {
    let reconcile = match reconcile.run().await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(error = %e, "Reconciliation sweep failed");
            None
        }
    };
    let compensate = match compensate.run().await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(error = %e, "Compensation sweep failed");
            None
        }
    };
    CycleOutcome {
        reconcile,
        compensate,
    }
}

async fn run_loop(
    reconcile: Arc<ReconciliationTask>,
    compensate: Arc<CompensationTask>,
    events: Arc<EventBus>,
    config: MonitorConfig,
    token: CancellationToken,
) {
    let interval_secs = config.interval.as_secs();
    info!(interval_secs, "Monitor started");
    events
        .emit(CoreEvent::Monitor(MonitorEvent::Started { interval_secs }))
        .ok();

    while !token.is_cancelled() {
        let cycle = AssertUnwindSafe(run_cycle(&reconcile, &compensate))
            .catch_unwind()
            .await;

        if let Err(payload) = cycle {
            let message = panic_message(payload.as_ref());
            error!(message = %message, "Monitor cycle panicked");
            events
                .emit(CoreEvent::Monitor(MonitorEvent::CycleFailed { message }))
                .ok();
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(config.interval) => {}
        }
    }

    info!("Monitor stopped");
    events.emit(CoreEvent::Monitor(MonitorEvent::Stopped)).ok();
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
