//! Dial model: state, merge and remap rules, and the render view.

pub mod state;
pub mod view;

pub use state::{
    merge, remap, slider_to_pos, wrap_pos, DisplayState, PartialDisplayState, DEFAULT_DETENTS,
    PRESET_DETENTS,
};
pub use view::DialView;
