//! Composition root.
//!
//! [`Engine`] owns the monitor state, the sampling task and the published
//! view. Each sampler cycle is applied under the state lock and the resulting
//! [`MonitorView`] is pushed through a `watch` channel, so readers never wait
//! on the sampling timeline and always see a complete view.
//!
//! Lifecycle follows the background-task pattern used elsewhere in the agent:
//! a [`CancellationToken`] per run, and [`Engine::stop`] awaits the task so no
//! cycle executes after it returns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gpuwatch_core::alert::TransitionKind;
use gpuwatch_core::error::CoreError;
use gpuwatch_core::hardware::monitor::{CycleReport, MonitorState, MonitorView};
use gpuwatch_core::monitor_config::MonitorConfig;
use gpuwatch_core::types::GpuIndex;

use crate::sampler::{Cycle, Sampler};
use crate::source::SnapshotSource;

/// State shared between the engine handle and its sampling task.
struct Shared {
    state: Mutex<MonitorState>,
    view_tx: watch::Sender<Arc<MonitorView>>,
}

impl Shared {
    async fn apply(&self, cycle: Cycle) -> Arc<MonitorView> {
        let mut state = self.state.lock().await;
        match cycle {
            Ok(snapshot) => match state.apply_snapshot(snapshot) {
                Ok(report) => log_report(&report),
                Err(e) => tracing::warn!(error = %e, "Rejected snapshot"),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Acquisition failed");
                state.record_failure(e.to_string());
            }
        }
        self.publish(&state)
    }

    fn publish(&self, state: &MonitorState) -> Arc<MonitorView> {
        let view = Arc::new(state.view());
        self.view_tx.send_replace(Arc::clone(&view));
        view
    }
}

fn log_report(report: &CycleReport) {
    for t in &report.transitions {
        match t.kind {
            TransitionKind::Opened => {
                tracing::warn!(alert_id = %t.id, severity = %t.severity, value = t.value, "Alert opened")
            }
            TransitionKind::SeverityChanged => {
                tracing::warn!(alert_id = %t.id, severity = %t.severity, value = t.value, "Alert severity changed")
            }
            TransitionKind::Resolved => {
                tracing::info!(alert_id = %t.id, value = t.value, "Alert resolved")
            }
            TransitionKind::Refreshed => {
                tracing::debug!(alert_id = %t.id, value = t.value, "Alert refreshed")
            }
        }
    }
    for e in &report.undefined {
        tracing::debug!(error = %e, "Metric skipped this cycle");
    }
    tracing::debug!(gpu_count = report.gpu_count, "Cycle applied");
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Engine {
    shared: Arc<Shared>,
    interval_tx: watch::Sender<Duration>,
    source: Arc<dyn SnapshotSource>,
    task: Option<RunningTask>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine. The configuration is validated here; nothing runs
    /// until [`start`](Self::start).
    pub fn new(config: MonitorConfig, source: Arc<dyn SnapshotSource>) -> Result<Self, CoreError> {
        config.validate()?;

        let state = MonitorState::new(config.thresholds());
        let (view_tx, _) = watch::channel(Arc::new(state.view()));
        let (interval_tx, _) = watch::channel(config.poll_interval());

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                view_tx,
            }),
            interval_tx,
            source,
            task: None,
        })
    }

    /// Spawn the sampling task. Returns `false` if it was already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }

        let cancel = CancellationToken::new();
        let sampler = Sampler::new(
            Arc::clone(&self.source),
            self.interval_tx.subscribe(),
            cancel.child_token(),
        );
        let shared = Arc::clone(&self.shared);

        let handle = tokio::spawn(async move {
            let cycles = sampler.poll();
            tokio::pin!(cycles);
            while let Some(cycle) = cycles.next().await {
                shared.apply(cycle).await;
            }
            tracing::info!("Sampling task stopped");
        });

        tracing::info!(
            interval_ms = self.poll_interval().as_millis() as u64,
            "Engine started"
        );
        self.task = Some(RunningTask { cancel, handle });
        true
    }

    /// Cancel the sampling task and wait for it to finish. A cycle already
    /// being applied completes first; none start afterwards.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            tracing::error!(error = %e, "Sampling task ended abnormally");
        }
        tracing::info!("Engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    pub fn poll_interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// Change the cadence. The running timer restarts; accumulated history
    /// and alerts are kept.
    pub fn set_poll_interval(&self, interval: Duration) -> Result<(), CoreError> {
        if interval.is_zero() {
            return Err(CoreError::Configuration(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        let changed = self.interval_tx.send_if_modified(|current| {
            if *current == interval {
                return false;
            }
            *current = interval;
            true
        });
        if changed {
            tracing::debug!(interval_ms = interval.as_millis() as u64, "Polling interval updated");
        }
        Ok(())
    }

    /// The latest published view.
    pub fn view(&self) -> Arc<MonitorView> {
        Arc::clone(&self.shared.view_tx.borrow())
    }

    /// A receiver notified after every published cycle.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MonitorView>> {
        self.shared.view_tx.subscribe()
    }

    /// Remove an alert by id and republish. No-op if it does not exist.
    pub async fn dismiss(&self, alert_id: &str) -> bool {
        let mut state = self.shared.state.lock().await;
        if !state.dismiss(alert_id) {
            return false;
        }
        tracing::info!(alert_id, "Alert dismissed");
        self.shared.publish(&state);
        true
    }

    /// Re-seed peak temperature for one GPU, or all when `None`, and republish.
    pub async fn reset_peaks(&self, gpu_index: Option<GpuIndex>) -> usize {
        let mut state = self.shared.state.lock().await;
        let reset = state.reset_peaks(gpu_index);
        tracing::info!(?gpu_index, reset, "Peak temperatures reset");
        self.shared.publish(&state);
        reset
    }

    /// Hand every view published from now on to `on_view` until `shutdown`
    /// completes or the engine is dropped. `shutdown` is polled for the whole
    /// call, so a signal raised inside `on_view` is not lost.
    pub async fn watch_until<F>(&self, shutdown: F, mut on_view: impl FnMut(&MonitorView))
    where
        F: Future,
    {
        let mut views = self.subscribe();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => return,
                changed = views.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let view = Arc::clone(&views.borrow_and_update());
                    on_view(&view);
                }
            }
        }
    }

    /// Apply one cycle outcome directly, bypassing the timer.
    pub async fn apply(&self, cycle: Cycle) -> Arc<MonitorView> {
        self.shared.apply(cycle).await
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel.cancel();
        }
    }
}
