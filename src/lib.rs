//! Virtual Detents
//!
//! Keeps an on-screen dial in sync with a motorized knob that simulates
//! detents (click stops).
//!
//! This library provides:
//! - Dial state, merge rules and the view model for the circular display
//! - The JSON wire protocol spoken between displays and the knob controller
//! - A WebSocket sync client for displays
//! - The knob controller peer (feature `peer`)

pub mod bus;
pub mod client;
pub mod config;
pub mod dial;
#[cfg(feature = "peer")]
pub mod peer;
pub mod protocol;
