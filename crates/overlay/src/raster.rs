//! RGBA raster surface backed by `image` + `imageproc`.
//!
//! Text needs a TrueType/OpenType face. Without one, text calls are
//! skipped and widths fall back to a monospace estimate, so boxes and
//! label backgrounds still render.

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use vigil_core::geometry::{Rect, Size};

use crate::surface::{monospace_width, Color, FontSpec, Surface};

/// Errors from loading fonts or writing raster output.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid font file {0}")]
    Font(String),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Load a font face from disk.
pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, RasterError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| RasterError::Io {
        path: path.display().to_string(),
        source,
    })?;
    FontArc::try_from_vec(bytes).map_err(|_| RasterError::Font(path.display().to_string()))
}

/// Transparent RGBA pixel buffer.
pub struct RasterSurface {
    image: RgbaImage,
    font: Option<FontArc>,
}

impl RasterSurface {
    pub fn new(size: Size, font: Option<FontArc>) -> Self {
        if font.is_none() {
            tracing::debug!("Raster overlay has no font; label text will be skipped");
        }
        let (w, h) = pixel_dims(size);
        Self {
            image: RgbaImage::new(w, h),
            font,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Write the current buffer as PNG.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), RasterError> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

impl Surface for RasterSurface {
    fn resize(&mut self, size: Size) {
        let (w, h) = pixel_dims(size);
        self.image = RgbaImage::new(w, h);
    }

    fn size(&self) -> Size {
        Size::new(f64::from(self.image.width()), f64::from(self.image.height()))
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f64) {
        let width = line_width.round().max(1.0) as i32;
        let inner = width / 2;
        let outer = width - inner - 1;
        // Concentric one-pixel outlines centred on the rectangle edge.
        for k in -outer..=inner {
            let k = f64::from(k);
            let ring = Rect {
                x: rect.x + k,
                y: rect.y + k,
                width: rect.width - 2.0 * k,
                height: rect.height - 2.0 * k,
            };
            if let Some(r) = to_pixel_rect(ring) {
                draw_hollow_rect_mut(&mut self.image, r, to_rgba(color));
            }
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        if let Some(r) = to_pixel_rect(rect) {
            draw_filled_rect_mut(&mut self.image, r, to_rgba(color));
        }
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, font: FontSpec, color: Color) {
        let Some(face) = &self.font else {
            return;
        };
        let scale = PxScale::from(font.size_px as f32);
        let ascent = f64::from(face.as_scaled(scale).ascent());
        let left = x.round() as i32;
        let top = (y - ascent).round() as i32;
        let rgba = to_rgba(color);

        draw_text_mut(&mut self.image, rgba, left, top, scale, face, text);
        if font.bold {
            draw_text_mut(&mut self.image, rgba, left + 1, top, scale, face, text);
        }
    }

    fn measure_text(&self, text: &str, font: FontSpec) -> f64 {
        match &self.font {
            Some(face) => {
                let (w, _) = text_size(PxScale::from(font.size_px as f32), face, text);
                f64::from(w)
            }
            None => monospace_width(text, font),
        }
    }
}

fn pixel_dims(size: Size) -> (u32, u32) {
    if !size.is_drawable() {
        return (0, 0);
    }
    (size.width.round() as u32, size.height.round() as u32)
}

/// Rounded integer rectangle, or `None` if it is empty.
fn to_pixel_rect(rect: Rect) -> Option<imageproc::rect::Rect> {
    let x = rect.x.round();
    let y = rect.y.round();
    let w = (rect.x + rect.width).round() - x;
    let h = (rect.y + rect.height).round() - y;
    if !(w >= 1.0 && h >= 1.0) {
        return None;
    }
    Some(imageproc::rect::Rect::at(x as i32, y as i32).of_size(w as u32, h as u32))
}

fn to_rgba(color: Color) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, color.a])
}
