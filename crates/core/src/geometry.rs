//! Aspect-fit ("contain") mapping from detector space to display space.
//!
//! The detector reports boxes in its own source resolution; the video
//! surface on screen is letterboxed to preserve aspect ratio. The
//! transform is recomputed whenever either side changes.

use crate::types::DetectionFrame;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Both dimensions finite and strictly positive.
    pub fn is_drawable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Axis-aligned rectangle in display space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Uniform scale plus centering offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainTransform {
    pub scale: f64,
    pub off_x: f64,
    pub off_y: f64,
}

impl ContainTransform {
    /// Fit `source` inside `display` without stretching.
    ///
    /// Returns `None` when either size has a zero, negative or
    /// non-finite dimension.
    pub fn fit(display: Size, source: Size) -> Option<Self> {
        if !display.is_drawable() || !source.is_drawable() {
            return None;
        }
        let scale = (display.width / source.width).min(display.height / source.height);
        Some(Self {
            scale,
            off_x: (display.width - source.width * scale) / 2.0,
            off_y: (display.height - source.height * scale) / 2.0,
        })
    }

    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale + self.off_x, y * self.scale + self.off_y)
    }

    /// Map an `(x1, y1, x2, y2)` box to a display rectangle.
    pub fn map_rect(&self, xyxy: [f64; 4]) -> Rect {
        let (x1, y1) = self.map_point(xyxy[0], xyxy[1]);
        let (x2, y2) = self.map_point(xyxy[2], xyxy[3]);
        Rect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }
}

/// Detector resolution for `frame`, or `fallback` when the frame does
/// not carry a usable one.
pub fn source_size(frame: &DetectionFrame, fallback: Size) -> Size {
    match (frame.width, frame.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Size::new(f64::from(w), f64::from(h)),
        _ => fallback,
    }
}
