use crate::surface::{Color, FontSpec};

/// Colours, font sizes and line widths for detection annotations.
///
/// Sizes are given at scale 1.0 and multiplied by the contain-transform
/// scale, never dropping below their floor.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub alert_color: Color,
    pub detection_color: Color,
    pub label_text_color: Color,
    pub track_id_color: Color,
    pub label_font: ScaledSize,
    pub track_id_font: ScaledSize,
    pub alert_font: ScaledSize,
    pub line_width: ScaledSize,
    /// Height of the filled label strip above a box.
    pub label_height: f64,
    /// Horizontal padding inside the label strip.
    pub label_padding: f64,
    pub alert_marker: String,
}

/// A base size with a lower bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledSize {
    pub base: f64,
    pub floor: f64,
}

impl ScaledSize {
    pub const fn new(base: f64, floor: f64) -> Self {
        Self { base, floor }
    }

    pub fn at(&self, scale: f64) -> f64 {
        (self.base * scale).max(self.floor)
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            alert_color: Color::rgb(0xff, 0x00, 0x00),
            detection_color: Color::rgb(0x4a, 0x9e, 0xff),
            label_text_color: Color::WHITE,
            track_id_color: Color::rgb(0xff, 0xff, 0x00),
            label_font: ScaledSize::new(14.0, 12.0),
            track_id_font: ScaledSize::new(12.0, 10.0),
            alert_font: ScaledSize::new(16.0, 14.0),
            line_width: ScaledSize::new(3.0, 2.0),
            label_height: 20.0,
            label_padding: 4.0,
            alert_marker: "INTRUDER_ALERT".to_string(),
        }
    }
}

impl OverlayStyle {
    pub fn box_color(&self, alert: bool) -> Color {
        if alert {
            self.alert_color
        } else {
            self.detection_color
        }
    }

    pub fn label_font_at(&self, scale: f64) -> FontSpec {
        FontSpec::regular(self.label_font.at(scale))
    }

    pub fn track_id_font_at(&self, scale: f64) -> FontSpec {
        FontSpec::regular(self.track_id_font.at(scale))
    }

    pub fn alert_font_at(&self, scale: f64) -> FontSpec {
        FontSpec::bold(self.alert_font.at(scale))
    }
}
