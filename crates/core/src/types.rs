//! Wire-level data model shared by the stream, overlay and console crates.
//!
//! Field names match the JSON emitted by the detection backend, so these
//! types deserialize directly from stream messages and registry responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch, as sent by the detector.
pub type Timestamp = f64;

/// Track identifier value the detector uses when no tracker is running.
pub const NO_TRACK: i64 = 0;

/// One detection within a frame, in detector-space pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    /// Tracker-assigned identity. [`NO_TRACK`] when untracked.
    #[serde(default)]
    pub id: i64,
    /// Class label, e.g. `"person"`.
    pub cls: String,
    /// Confidence in `[0, 1]`.
    pub conf: f64,
    /// `(x1, y1, x2, y2)` corners.
    pub xyxy: [f64; 4],
    /// Name of the model that produced the box.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Active alert condition (e.g. an intrusion) reported for this box.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl DetectionBox {
    /// True when the box carries a non-empty `event`.
    pub fn is_alert(&self) -> bool {
        self.event.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// True when the box carries a real track identity.
    pub fn has_track(&self) -> bool {
        self.id != NO_TRACK
    }
}

/// A batch of detections for one processed video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub ts: Timestamp,
    /// Increasing frame counter. Used for log sampling only.
    pub frame_idx: u64,
    pub boxes: Vec<DetectionBox>,
    #[serde(default)]
    pub fps: f64,
    /// Detector source resolution, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl DetectionFrame {
    /// Copy of this frame's metadata carrying a different box list.
    pub fn with_boxes(&self, boxes: Vec<DetectionBox>) -> Self {
        Self {
            ts: self.ts,
            frame_idx: self.frame_idx,
            boxes,
            fps: self.fps,
            width: self.width,
            height: self.height,
        }
    }
}

/// Registry-side configuration of a detection model.
///
/// The console keeps an eventually-consistent cached copy; the backend
/// registry owns the authoritative value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    pub enabled: bool,
    pub conf: f64,
    pub iou: f64,
    /// Ordered label list the model can emit.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub enabled_classes: BTreeMap<String, bool>,
}

/// Partial update accepted by the registry's `update model` call.
///
/// Only populated fields are serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iou: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_classes: Option<BTreeMap<String, bool>>,
}

impl ModelUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn confidence(conf: f64) -> Self {
        Self {
            conf: Some(conf),
            ..Default::default()
        }
    }

    pub fn classes(enabled_classes: BTreeMap<String, bool>) -> Self {
        Self {
            enabled_classes: Some(enabled_classes),
            ..Default::default()
        }
    }
}
