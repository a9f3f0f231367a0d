//! Per-frame detection filtering against the operator selection.

use crate::selection::OperatorSelection;
use crate::types::DetectionFrame;

/// Keep only the boxes the operator currently wants to see.
///
/// A box survives iff its model is selected and its class is in that
/// model's class selection. Frame metadata is carried over unchanged.
pub fn filter_frame(frame: &DetectionFrame, selection: &OperatorSelection) -> DetectionFrame {
    let boxes = frame
        .boxes
        .iter()
        .filter(|b| selection.is_eligible(b))
        .cloned()
        .collect();
    frame.with_boxes(boxes)
}
