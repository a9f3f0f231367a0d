//! Configuration reconciler.
//!
//! Pushes the operator's per-model class choices to the backend registry
//! and restarts the detection session. Each pass is tagged with a
//! generation; a newer pass aborts the older one, and every side effect
//! after an await re-checks that its generation is still current.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vigil_core::backend::DetectionBackend;
use vigil_core::selection::{OperatorSelection, SelectionCell};
use vigil_core::types::ModelUpdate;

use crate::catalog::ModelCatalog;
use crate::live_view::LiveView;

/// Default pause between stopping and restarting the session.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Operator-visible state of the backend detection session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionStatus {
    Stopped,
    /// Class maps are being pushed or the session is being restarted.
    Restarting,
    Detecting,
    /// The last start attempt failed. Not retried automatically.
    Failed { reason: String },
}

impl DetectionStatus {
    pub fn is_detecting(&self) -> bool {
        matches!(self, DetectionStatus::Detecting)
    }
}

#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn DetectionBackend>,
    catalog: ModelCatalog,
    selection: SelectionCell,
    view: LiveView,
    settle_delay: Duration,
    status_tx: watch::Sender<DetectionStatus>,
    generation: AtomicU64,
    pass: Mutex<Option<JoinHandle<()>>>,
}

impl Reconciler {
    pub fn new(
        backend: Arc<dyn DetectionBackend>,
        catalog: ModelCatalog,
        selection: SelectionCell,
        view: LiveView,
        settle_delay: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(DetectionStatus::Stopped);
        Self {
            inner: Arc::new(Inner {
                backend,
                catalog,
                selection,
                view,
                settle_delay,
                status_tx,
                generation: AtomicU64::new(0),
                pass: Mutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> DetectionStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<DetectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Generation of the most recently started pass.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Start a pass for the current selection, superseding any pass
    /// still in flight. Returns the new generation.
    pub fn reconcile(&self) -> u64 {
        let mut slot = self.lock_pass();
        // Bumped under the pass lock so the installed pass is always the
        // newest generation.
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let selection = self.inner.selection.current();

        if let Some(previous) = slot.take() {
            if !previous.is_finished() {
                tracing::debug!(generation, "Superseding in-flight reconciliation");
            }
            previous.abort();
        }

        let this = self.clone();
        *slot = Some(tokio::spawn(async move {
            this.run_pass(generation, selection).await;
        }));
        generation
    }

    /// Reconcile on every selection change until `cancel` fires.
    ///
    /// Bursts of edits collapse into one pass per observed change.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        let mut changes = self.inner.selection.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        changes.borrow_and_update();
                        this.reconcile();
                    }
                }
            }
            this.abort();
            tracing::debug!("Reconciler stopped");
        })
    }

    /// Abort the in-flight pass, if any. Later completions are ignored.
    pub fn abort(&self) {
        let mut slot = self.lock_pass();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(pass) = slot.take() {
            pass.abort();
        }
    }

    /// Wait for the in-flight pass to finish. Test and shutdown helper.
    pub async fn settled(&self) {
        let pass = self.lock_pass().take();
        if let Some(pass) = pass {
            let _ = pass.await;
        }
    }

    fn lock_pass(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner.pass.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    fn publish(&self, generation: u64, status: DetectionStatus) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.inner.status_tx.send_replace(status);
        true
    }

    async fn run_pass(&self, generation: u64, selection: OperatorSelection) {
        let backend = &self.inner.backend;

        if !selection.has_active_classes() {
            self.inner.view.clear();
            if let Err(e) = backend.stop_detection().await {
                tracing::warn!(generation, error = %e, "Failed to stop detection session");
            }
            if self.publish(generation, DetectionStatus::Stopped) {
                tracing::info!(generation, "No active classes, detection stopped");
            }
            return;
        }

        self.publish(generation, DetectionStatus::Restarting);

        let pushes = selection.selected_models().iter().map(|model| {
            let selection = &selection;
            async move {
                let labels = self.inner.catalog.labels(model).await;
                let update = ModelUpdate::classes(selection.class_map(model, &labels));
                match backend.update_model(model, &update).await {
                    Ok(()) => self.inner.catalog.apply(model, &update).await,
                    Err(e) => {
                        tracing::warn!(generation, model = %model, error = %e, "Failed to push class selection");
                    }
                }
            }
        });
        join_all(pushes).await;

        if !self.is_current(generation) {
            return;
        }
        if let Err(e) = backend.stop_detection().await {
            tracing::debug!(generation, error = %e, "Stop before restart failed");
        }

        tokio::time::sleep(self.inner.settle_delay).await;
        if !self.is_current(generation) {
            return;
        }

        let active: Vec<&str> = selection.active_models().collect();
        match backend.start_detection().await {
            Ok(ack) => {
                if self.publish(generation, DetectionStatus::Detecting) {
                    tracing::info!(
                        generation,
                        models = ?active,
                        status = ?ack.status,
                        "Detection started",
                    );
                }
            }
            Err(e) => {
                let reason = e.reason().to_string();
                if self.publish(generation, DetectionStatus::Failed { reason }) {
                    tracing::error!(generation, error = %e, "Failed to start detection");
                }
            }
        }
    }
}
