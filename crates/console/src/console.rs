//! Console controller.
//!
//! [`Console`] wires the stream transport, the live view and the
//! reconciler around one shared [`SelectionCell`], and exposes the
//! operator actions. Operator actions are the only writers of the
//! selection; frames never mutate it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vigil_core::backend::DetectionBackend;
use vigil_core::error::{BackendError, CoreError};
use vigil_core::geometry::Size;
use vigil_core::selection::{OperatorSelection, SelectionCell};
use vigil_core::types::{DetectionFrame, ModelUpdate};
use vigil_stream::api::{ApiError, BackendApi};
use vigil_stream::client::StreamClient;
use vigil_stream::reconnect::ReconnectConfig;
use vigil_stream::transport::StreamTransport;

use crate::catalog::ModelCatalog;
use crate::config::ConsoleConfig;
use crate::live_view::LiveView;
use crate::reconciler::Reconciler;

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Selection(#[from] CoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Knobs for assembling a [`Console`].
#[derive(Debug, Clone)]
pub struct ConsoleOptions {
    pub reconnect: ReconnectConfig,
    pub settle_delay: Duration,
    pub display_size: Size,
    pub initial_selection: OperatorSelection,
}

impl ConsoleOptions {
    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self {
            reconnect: ReconnectConfig {
                max_attempts: config.reconnect_max_attempts,
                ..ReconnectConfig::default()
            },
            settle_delay: config.settle_delay,
            display_size: config.display_size,
            initial_selection: config.selection.clone(),
        }
    }
}

pub struct Console {
    backend: Arc<dyn DetectionBackend>,
    catalog: ModelCatalog,
    selection: SelectionCell,
    view: LiveView,
    transport: StreamTransport,
    reconciler: Reconciler,
    cancel: CancellationToken,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl Console {
    pub fn new(
        backend: Arc<dyn DetectionBackend>,
        stream: StreamClient,
        options: ConsoleOptions,
    ) -> Self {
        let selection = SelectionCell::new(options.initial_selection);
        let catalog = ModelCatalog::new();
        let view = LiveView::new(selection.clone(), options.display_size);

        let sink = view.clone();
        let transport =
            StreamTransport::new(stream, options.reconnect, move |frame: DetectionFrame| {
                sink.ingest(frame)
            });

        let reconciler = Reconciler::new(
            Arc::clone(&backend),
            catalog.clone(),
            selection.clone(),
            view.clone(),
            options.settle_delay,
        );

        Self {
            backend,
            catalog,
            selection,
            view,
            transport,
            reconciler,
            cancel: CancellationToken::new(),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Build a console talking to the HTTP backend named in `config`.
    pub fn from_config(config: &ConsoleConfig) -> Result<Self, ConsoleError> {
        let api = BackendApi::new(&config.backend_url)?;
        Ok(Self::new(
            Arc::new(api),
            StreamClient::new(config.stream_url.clone()),
            ConsoleOptions::from_config(config),
        ))
    }

    /// Load the model catalog, open the stream and run the first
    /// reconciliation.
    ///
    /// A catalog failure is logged, not fatal: the console still streams
    /// and the catalog can be refreshed later.
    pub async fn start(&self) {
        if let Err(e) = self.refresh_models().await {
            tracing::warn!(error = %e, "Failed to load model catalog");
        }

        self.transport.connect();

        let watchers = [
            self.view.spawn_selection_watch(self.cancel.child_token()),
            self.reconciler.spawn(self.cancel.child_token()),
        ];
        for old in std::mem::replace(&mut *self.lock_watchers(), watchers.into()) {
            old.abort();
        }
        self.reconciler.reconcile();

        tracing::info!(url = %self.transport.url(), "Console started");
    }

    pub fn selection(&self) -> &SelectionCell {
        &self.selection
    }

    pub fn view(&self) -> &LiveView {
        &self.view
    }

    pub fn transport(&self) -> &StreamTransport {
        &self.transport
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Cancelled by [`shutdown`](Self::shutdown).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Reload the catalog from the registry.
    pub async fn refresh_models(&self) -> Result<usize, ConsoleError> {
        Ok(self.catalog.refresh(self.backend.as_ref()).await?)
    }

    /// Enable or disable a model in the registry and select or deselect
    /// it locally.
    ///
    /// Nothing changes locally when the registry rejects the update.
    /// The overlay is blanked either way the toggle goes.
    pub async fn set_model_enabled(&self, name: &str, enabled: bool) -> Result<(), ConsoleError> {
        let update = ModelUpdate::enabled(enabled);
        self.backend.update_model(name, &update).await?;
        self.catalog.apply(name, &update).await;

        self.selection.update(|sel| sel.set_model_selected(name, enabled));
        self.view.clear();

        tracing::info!(model = %name, enabled, "Model toggled");
        Ok(())
    }

    /// Replace the class selection for a selected model. A change blanks
    /// the overlay until the next frame.
    pub fn set_model_classes<I, S>(&self, model: &str, classes: I) -> Result<bool, ConsoleError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let changed = self
            .selection
            .try_update(|sel| sel.set_model_classes(model, classes))?;
        if changed {
            self.view.clear();
        }
        Ok(changed)
    }

    /// Add or remove one class for a selected model.
    pub fn toggle_class(&self, model: &str, cls: &str, on: bool) -> Result<bool, ConsoleError> {
        let changed = self
            .selection
            .try_update(|sel| sel.toggle_class(model, cls, on))?;
        if changed {
            self.view.clear();
        }
        Ok(changed)
    }

    /// Push a new confidence threshold for `name`.
    pub async fn set_model_confidence(&self, name: &str, conf: f64) -> Result<(), ConsoleError> {
        if !(0.0..=1.0).contains(&conf) {
            return Err(CoreError::Validation(format!("confidence {conf} outside [0, 1]")).into());
        }
        let update = ModelUpdate::confidence(conf);
        self.backend.update_model(name, &update).await?;
        self.catalog.apply(name, &update).await;
        tracing::info!(model = %name, conf, "Model confidence updated");
        Ok(())
    }

    /// Stop background work and close the stream intentionally.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down console");
        self.cancel.cancel();

        let watchers = std::mem::take(&mut *self.lock_watchers());
        let _ = tokio::time::timeout(Duration::from_secs(5), join_all(watchers)).await;
        self.reconciler.abort();
        self.transport.disconnect().await;
        self.view.clear();

        tracing::info!("Console shut down complete");
    }

    fn lock_watchers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
