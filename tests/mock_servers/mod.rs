//! Mock servers for client integration testing
//!
//! These stand in for the knob controller so the display client can be
//! tested against a real socket without the control loop.

pub mod peer;

pub use peer::MockPeer;
