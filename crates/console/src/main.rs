//! `vigil-console` -- headless live detection console.
//!
//! Connects to the detection backend, applies the operator selection
//! from `VIGIL_SELECTION`, keeps the backend session reconciled with it,
//! and renders the filtered overlay into an RGBA surface. With
//! `VIGIL_SNAPSHOT_PATH` set, the overlay is written out as PNG at most
//! once per second.
//!
//! See [`ConsoleConfig::from_env`] for the full variable list.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil_console::config::ConsoleConfig;
use vigil_console::Console;
use vigil_overlay::{load_font, OverlayRenderer, RasterSurface};

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_console=info,vigil_stream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConsoleConfig::from_env()?;
    tracing::info!(
        backend = %config.backend_url,
        stream = %config.stream_url,
        models = config.selection.selected_models().len(),
        "Starting vigil-console",
    );

    let font = config.overlay_font.as_deref().and_then(|path| match load_font(path) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = %e, "Overlay font unavailable, labels will not be rasterised");
            None
        }
    });

    let console = Console::from_config(&config)?;
    console.start().await;

    let cancel = console.cancel_token();
    let status_task = tokio::spawn(log_status(&console, cancel.clone()));

    let renderer = OverlayRenderer::new(
        RasterSurface::new(config.display_size, font),
        config.source_size,
    );
    let view = console.view().clone();
    let snapshot_path = config.snapshot_path.clone();
    let render_task = tokio::spawn(async move {
        let mut last_write: Option<Instant> = None;
        view.run_renderer(renderer, cancel, |r, _painted| {
            let Some(path) = snapshot_path.as_deref() else {
                return;
            };
            if last_write.is_some_and(|t| t.elapsed() < SNAPSHOT_INTERVAL) {
                return;
            }
            last_write = Some(Instant::now());
            write_snapshot(r.surface(), path);
        })
        .await
    });

    shutdown_signal().await;
    console.shutdown().await;

    if let Ok(renderer) = render_task.await {
        if let Some(path) = config.snapshot_path.as_deref() {
            write_snapshot(renderer.surface(), path);
        }
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), status_task).await;

    tracing::info!("vigil-console stopped");
    Ok(())
}

fn write_snapshot(surface: &RasterSurface, path: &Path) {
    if let Err(e) = surface.save_png(path) {
        tracing::warn!(error = %e, path = %path.display(), "Failed to write overlay snapshot");
    }
}

/// Log session and connection state transitions until cancelled.
fn log_status(console: &Console, cancel: CancellationToken) -> impl std::future::Future<Output = ()> {
    let mut status = console.reconciler().watch_status();
    let mut connection = console.transport().watch_state();
    let view = console.view().clone();

    async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = status.borrow_and_update().clone();
                    tracing::info!(status = ?current, fps = view.fps(), "Detection status changed");
                }
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = connection.borrow_and_update().clone();
                    if current.is_failed() {
                        tracing::error!(state = ?current, "Detection stream gave up reconnecting");
                    } else {
                        tracing::info!(state = ?current, "Detection stream state changed");
                    }
                }
            }
        }
    }
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
