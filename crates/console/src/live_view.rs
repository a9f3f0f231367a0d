//! Live detection view: filter-on-arrival, latest-wins frame slot and
//! the render loop that paints it.
//!
//! The stream callback is registered once, when the transport is built,
//! and reads the operator selection through [`SelectionCell`] on every
//! frame. Frames are never queued; a newer frame replaces whatever has
//! not been painted yet. Any selection change blanks the slot until the
//! next frame arrives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vigil_core::filter::filter_frame;
use vigil_core::geometry::Size;
use vigil_core::selection::SelectionCell;
use vigil_core::types::DetectionFrame;
use vigil_overlay::{OverlayRenderer, Surface};

/// Emit one diagnostic line per this many frames.
pub const LOG_SAMPLE_EVERY: u64 = 30;

#[derive(Clone)]
pub struct LiveView {
    inner: Arc<Inner>,
}

struct Inner {
    selection: SelectionCell,
    frame_tx: watch::Sender<Option<DetectionFrame>>,
    display_tx: watch::Sender<Size>,
    /// `f64` bits of the last reported stream fps.
    fps: AtomicU64,
}

impl LiveView {
    pub fn new(selection: SelectionCell, display: Size) -> Self {
        let (frame_tx, _) = watch::channel(None);
        let (display_tx, _) = watch::channel(display);
        Self {
            inner: Arc::new(Inner {
                selection,
                frame_tx,
                display_tx,
                fps: AtomicU64::new(0f64.to_bits()),
            }),
        }
    }

    /// Handle one inbound frame: filter it against the live selection
    /// and publish it as the latest frame.
    ///
    /// Filtering happens while the slot is held, so a [`clear`](Self::clear)
    /// issued after a selection edit is never overwritten by a frame
    /// filtered against the old selection.
    pub fn ingest(&self, frame: DetectionFrame) {
        self.inner.fps.store(frame.fps.to_bits(), Ordering::Relaxed);

        let selection = &self.inner.selection;
        self.inner.frame_tx.send_modify(|slot| {
            let shown = selection.read(|sel| filter_frame(&frame, sel));
            if frame.frame_idx % LOG_SAMPLE_EVERY == 0 {
                let lag_ms = chrono::Utc::now().timestamp_millis() as f64 - frame.ts * 1000.0;
                tracing::debug!(
                    frame_idx = frame.frame_idx,
                    raw = frame.boxes.len(),
                    shown = shown.boxes.len(),
                    fps = frame.fps,
                    lag_ms,
                    "Detection frame sample",
                );
            }
            *slot = Some(shown);
        });
    }

    /// Latest displayable frame, if any.
    pub fn latest(&self) -> Option<DetectionFrame> {
        self.inner.frame_tx.borrow().clone()
    }

    /// Last fps reported by the stream.
    pub fn fps(&self) -> f64 {
        f64::from_bits(self.inner.fps.load(Ordering::Relaxed))
    }

    /// Blank the overlay until the next frame arrives.
    pub fn clear(&self) {
        self.inner.frame_tx.send_if_modified(|slot| slot.take().is_some());
    }

    /// Blank the overlay on every selection change until `cancel` fires.
    ///
    /// Covers every writer of the selection cell, including ones that
    /// bypass the console's operator actions.
    pub fn spawn_selection_watch(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let view = self.clone();
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
                        view.clear();
                    }
                }
            }
        })
    }

    /// Report a new on-screen size for the video surface.
    pub fn resize(&self, display: Size) {
        self.inner.display_tx.send_if_modified(|current| {
            if *current == display {
                return false;
            }
            *current = display;
            true
        });
    }

    pub fn display_size(&self) -> Size {
        *self.inner.display_tx.borrow()
    }

    /// Change-notified view of the frame slot.
    pub fn watch_frames(&self) -> watch::Receiver<Option<DetectionFrame>> {
        self.inner.frame_tx.subscribe()
    }

    /// Drive `renderer` from the frame slot and resize notifications
    /// until `cancel` fires. `on_paint` runs after every repaint with the
    /// number of boxes drawn.
    pub async fn run_renderer<S, F>(
        &self,
        mut renderer: OverlayRenderer<S>,
        cancel: CancellationToken,
        mut on_paint: F,
    ) -> OverlayRenderer<S>
    where
        S: Surface,
        F: FnMut(&OverlayRenderer<S>, usize),
    {
        let mut frames = self.inner.frame_tx.subscribe();
        let mut display = self.inner.display_tx.subscribe();

        let size = *display.borrow_and_update();
        renderer.resize(size);
        let frame = frames.borrow_and_update().clone();
        let painted = renderer.set_frame(frame);
        on_paint(&renderer, painted);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let frame = frames.borrow_and_update().clone();
                    let painted = renderer.set_frame(frame);
                    on_paint(&renderer, painted);
                }
                changed = display.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let size = *display.borrow_and_update();
                    tracing::debug!(width = size.width, height = size.height, "Overlay resized");
                    let painted = renderer.resize(size);
                    on_paint(&renderer, painted);
                }
            }
        }

        renderer
    }
}
