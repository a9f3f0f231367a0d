//! Recording surface: captures draw calls as data.
//!
//! Used for headless inspection of what the renderer painted, and as
//! the assertion target in tests.

use vigil_core::geometry::{Rect, Size};

use crate::surface::{monospace_width, Color, FontSpec, Surface};

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    StrokeRect {
        rect: Rect,
        color: Color,
        line_width: f64,
    },
    FillRect {
        rect: Rect,
        color: Color,
    },
    Text {
        text: String,
        x: f64,
        y: f64,
        font: FontSpec,
        color: Color,
    },
}

/// Surface that stores draw calls since the last clear.
#[derive(Debug, Clone)]
pub struct DisplayList {
    size: Size,
    ops: Vec<DrawOp>,
    clears: u64,
}

impl DisplayList {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            ops: Vec::new(),
            clears: 0,
        }
    }

    /// Draw calls issued since the last clear.
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn is_blank(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of full clears so far (resizes included).
    pub fn clear_count(&self) -> u64 {
        self.clears
    }

    /// All text strings drawn since the last clear, in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// All stroked rectangles since the last clear, in order.
    pub fn stroked_rects(&self) -> impl Iterator<Item = (&Rect, &Color)> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::StrokeRect { rect, color, .. } => Some((rect, color)),
            _ => None,
        })
    }
}

impl Surface for DisplayList {
    fn resize(&mut self, size: Size) {
        self.size = size;
        self.clear();
    }

    fn size(&self) -> Size {
        self.size
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.clears += 1;
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f64) {
        self.ops.push(DrawOp::StrokeRect {
            rect,
            color,
            line_width,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.ops.push(DrawOp::FillRect { rect, color });
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, font: FontSpec, color: Color) {
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            x,
            y,
            font,
            color,
        });
    }

    fn measure_text(&self, text: &str, font: FontSpec) -> f64 {
        monospace_width(text, font)
    }
}
