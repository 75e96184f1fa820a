//! Dial state and the pure operations on it.
//!
//! A dial has `detents` evenly spaced stops and a position `pos` measured in
//! detent units. Positions may be fractional and are reduced modulo `detents`
//! before they are rendered or put on the wire.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Detent count a fresh display starts with
pub const DEFAULT_DETENTS: NonZeroU32 = match NonZeroU32::new(6) {
    Some(n) => n,
    None => unreachable!(),
};

/// Detent presets offered by the display
pub const PRESET_DETENTS: [u32; 4] = [4, 8, 16, 32];

/// Full dial state as held locally and sent in `set_state`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    /// Number of discrete positions on the dial (never zero)
    pub detents: NonZeroU32,
    /// Current position in detent units, possibly fractional
    pub pos: f64,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            detents: DEFAULT_DETENTS,
            pos: 0.0,
        }
    }
}

impl DisplayState {
    pub fn new(detents: NonZeroU32, pos: f64) -> Self {
        Self { detents, pos }
    }

    /// Copy of this state with `pos` reduced into `[0, detents)`.
    pub fn normalized(&self) -> Self {
        Self {
            detents: self.detents,
            pos: wrap_pos(self.pos, self.detents),
        }
    }

    /// Position as shown on the dial face: `(detents - pos') mod detents`.
    pub fn remapped_pos(&self) -> f64 {
        remap(self.pos, self.detents)
    }
}

/// Partial update: local edits and inbound `state` payloads.
///
/// The peer reports `{pos}` on its own when the knob snaps, so either field
/// may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialDisplayState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detents: Option<NonZeroU32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<f64>,
}

impl PartialDisplayState {
    pub fn pos(pos: f64) -> Self {
        Self {
            detents: None,
            pos: Some(pos),
        }
    }

    pub fn detents(detents: NonZeroU32) -> Self {
        Self {
            detents: Some(detents),
            pos: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detents.is_none() && self.pos.is_none()
    }
}

impl From<DisplayState> for PartialDisplayState {
    fn from(state: DisplayState) -> Self {
        Self {
            detents: Some(state.detents),
            pos: Some(state.pos),
        }
    }
}

/// Overlay `update` onto `state`. Fields missing from the update keep their
/// current value; present fields win unconditionally.
pub fn merge(state: DisplayState, update: PartialDisplayState) -> DisplayState {
    DisplayState {
        detents: update.detents.unwrap_or(state.detents),
        pos: update.pos.unwrap_or(state.pos),
    }
}

/// Reduce `pos` into `[0, detents)`.
pub fn wrap_pos(pos: f64, detents: NonZeroU32) -> f64 {
    let n = f64::from(detents.get());
    let wrapped = pos.rem_euclid(n);
    // rem_euclid can round up to exactly n for tiny negative inputs
    if wrapped >= n {
        0.0
    } else {
        wrapped
    }
}

/// Mirror a position around the dial's zero point.
///
/// Used both for slider input and for the label on the dial face. The two
/// ends of the input range alias: `remap(0) == remap(detents) == 0`.
pub fn remap(pos: f64, detents: NonZeroU32) -> f64 {
    let n = f64::from(detents.get());
    wrap_pos(n - wrap_pos(pos, detents), detents)
}

/// Translate raw slider input `e` (0..=detents) into a dial position.
pub fn slider_to_pos(e: f64, detents: NonZeroU32) -> f64 {
    remap(e, detents)
}
