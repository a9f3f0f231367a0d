//! Immediate-mode drawing surface abstraction.
//!
//! The renderer only talks to [`Surface`], so the same paint routine can
//! target a recording [`DisplayList`](crate::display_list::DisplayList)
//! or a [`RasterSurface`](crate::raster::RasterSurface).

use vigil_core::geometry::{Rect, Size};

/// Straight-alpha RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if !digits.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
        match digits.len() {
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }
}

/// Font request: monospace at `size_px`, optionally bold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontSpec {
    pub size_px: f64,
    pub bold: bool,
}

impl FontSpec {
    pub fn regular(size_px: f64) -> Self {
        Self {
            size_px,
            bold: false,
        }
    }

    pub fn bold(size_px: f64) -> Self {
        Self {
            size_px,
            bold: true,
        }
    }
}

/// A transparent 2D surface layered over the video.
///
/// Coordinates are display-space pixels with the origin top-left. Text
/// is positioned by its baseline-left point, as on an HTML canvas.
pub trait Surface {
    /// Resize the drawable area. Content is discarded.
    fn resize(&mut self, size: Size);

    fn size(&self) -> Size;

    /// Erase everything to fully transparent.
    fn clear(&mut self);

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f64);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    fn fill_text(&mut self, text: &str, x: f64, y: f64, font: FontSpec, color: Color);

    /// Advance width of `text` when drawn with `font`.
    fn measure_text(&self, text: &str, font: FontSpec) -> f64;
}

/// Width estimate for a monospace face: 0.6 em per character.
pub fn monospace_width(text: &str, font: FontSpec) -> f64 {
    text.chars().count() as f64 * font.size_px * 0.6
}
