//! Render model for the dial face.
//!
//! Drawing is left to whatever front end consumes these views; this module
//! only computes what has to be drawn.

use serde::{Deserialize, Serialize};

use super::state::{DisplayState, PRESET_DETENTS};

/// Everything a front end needs to draw the dial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialView {
    pub detents: u32,
    /// Position after reduction modulo `detents`
    pub pos: f64,
    /// Mirrored position shown in the label
    pub remapped: f64,
    /// Text in the middle of the dial, e.g. "0 / 6"
    pub label: String,
    /// Rotation of the indicator dot in degrees; 0 puts the dot at the top
    pub rotation_deg: f64,
    /// Preset button to highlight, if the detent count matches one
    pub active_preset: Option<u32>,
}

impl DialView {
    pub fn from_state(state: &DisplayState) -> Self {
        let state = state.normalized();
        let detents = state.detents.get();
        let remapped = state.remapped_pos();
        let rotation_deg = if state.pos == 0.0 {
            0.0
        } else {
            -360.0 * state.pos / f64::from(detents)
        };

        Self {
            detents,
            pos: state.pos,
            remapped,
            label: format!("{} / {}", remapped, detents),
            rotation_deg,
            active_preset: PRESET_DETENTS.iter().copied().find(|&n| n == detents),
        }
    }

    pub fn dot_at_top(&self) -> bool {
        self.rotation_deg == 0.0
    }
}

impl From<&DisplayState> for DialView {
    fn from(state: &DisplayState) -> Self {
        Self::from_state(state)
    }
}
