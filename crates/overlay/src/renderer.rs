//! Immediate-mode detection overlay.
//!
//! The painted surface is a pure function of the latest frame and the
//! surface size: every redraw erases everything and paints from scratch.

use vigil_core::geometry::{source_size, ContainTransform, Rect, Size};
use vigil_core::types::{DetectionBox, DetectionFrame};

use crate::style::OverlayStyle;
use crate::surface::Surface;

/// Paints filtered detection frames onto a [`Surface`].
pub struct OverlayRenderer<S> {
    surface: S,
    style: OverlayStyle,
    fallback_source: Size,
    frame: Option<DetectionFrame>,
}

impl<S: Surface> OverlayRenderer<S> {
    /// `fallback_source` is used for frames that do not report their
    /// detector resolution.
    pub fn new(surface: S, fallback_source: Size) -> Self {
        Self {
            surface,
            style: OverlayStyle::default(),
            fallback_source,
            frame: None,
        }
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    pub fn frame(&self) -> Option<&DetectionFrame> {
        self.frame.as_ref()
    }

    /// Replace the displayed frame and repaint. `None` blanks the overlay.
    pub fn set_frame(&mut self, frame: Option<DetectionFrame>) -> usize {
        self.frame = frame;
        self.redraw()
    }

    /// Match the surface to a new on-screen video size and repaint.
    pub fn resize(&mut self, display: Size) -> usize {
        self.surface.resize(display);
        self.redraw()
    }

    /// Drop the current frame and erase the surface.
    pub fn clear(&mut self) {
        self.frame = None;
        self.surface.clear();
    }

    /// Repaint from scratch. Returns the number of boxes drawn.
    pub fn redraw(&mut self) -> usize {
        self.surface.clear();

        let Some(frame) = &self.frame else {
            return 0;
        };
        let source = source_size(frame, self.fallback_source);
        let Some(transform) = ContainTransform::fit(self.surface.size(), source) else {
            tracing::trace!(?source, "Overlay surface not drawable, skipping paint");
            return 0;
        };

        for b in &frame.boxes {
            paint_box(&mut self.surface, &self.style, &transform, b);
        }
        frame.boxes.len()
    }
}

fn paint_box<S: Surface>(
    surface: &mut S,
    style: &OverlayStyle,
    transform: &ContainTransform,
    detection: &DetectionBox,
) {
    let scale = transform.scale;
    let rect = transform.map_rect(detection.xyxy);
    let alert = detection.is_alert();
    let color = style.box_color(alert);

    surface.stroke_rect(rect, color, style.line_width.at(scale));

    let label = format!("{} {}%", detection.cls, (detection.conf * 100.0).round() as i64);
    let label_font = style.label_font_at(scale);
    let text_width = surface.measure_text(&label, label_font);
    surface.fill_rect(
        Rect {
            x: rect.x,
            y: rect.y - style.label_height,
            width: text_width + 2.0 * style.label_padding,
            height: style.label_height,
        },
        color,
    );
    surface.fill_text(
        &label,
        rect.x + style.label_padding,
        rect.y - 5.0,
        label_font,
        style.label_text_color,
    );

    if detection.has_track() {
        surface.fill_text(
            &format!("ID: {}", detection.id),
            rect.x,
            rect.bottom() + 15.0,
            style.track_id_font_at(scale),
            style.track_id_color,
        );
    }

    if alert {
        surface.fill_text(
            &style.alert_marker,
            rect.x,
            rect.y - 30.0,
            style.alert_font_at(scale),
            style.alert_color,
        );
    }
}
