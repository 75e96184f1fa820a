//! Detent logic for the knob controller.
//!
//! The shaft position is measured in turns. The controller keeps a target
//! (`detent_pos`) that always sits on a detent; the motor holds the shaft on
//! it. Turning the shaft more than half a detent away moves the target one
//! detent over, which is what the hand feels as a click.

use std::num::NonZeroU32;
use tracing::{debug, info};

use crate::dial::{wrap_pos, DisplayState, PartialDisplayState};
use crate::protocol::{ClientMessage, PeerMessage};

/// Fraction of a detent the shaft must travel before the target moves
pub const SNAP_START: f64 = 0.5;

/// Motor tuning
pub const VELOCITY: f64 = 2.0;
pub const INIT_VELOCITY: f64 = 1.0;
pub const MAX_TORQUE: f64 = 0.04;
pub const FF_TORQUE: f64 = 0.0;
pub const KP_SCALE: f64 = 1.0;
pub const KD_SCALE: f64 = 0.25;
/// Homing tolerance in turns
pub const POS_DIFF: f64 = 0.01;

/// One position-mode command for the motor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorCommand {
    pub stop_position: f64,
    pub velocity: f64,
    pub maximum_torque: f64,
    pub feedforward_torque: f64,
    pub kp_scale: f64,
    pub kd_scale: f64,
}

impl MotorCommand {
    /// Hold the shaft on `target` with detent stiffness
    pub fn hold(target: f64) -> Self {
        Self {
            stop_position: target,
            velocity: VELOCITY,
            maximum_torque: MAX_TORQUE,
            feedforward_torque: FF_TORQUE,
            kp_scale: KP_SCALE,
            kd_scale: KD_SCALE,
        }
    }

    /// Slow move used while homing
    pub fn home(target: f64) -> Self {
        Self {
            velocity: INIT_VELOCITY,
            ..Self::hold(target)
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetentController {
    detents: NonZeroU32,
    detent_pos: f64,
    /// Target was moved by a display; don't snap until the shaft catches up
    seeking: bool,
}

impl DetentController {
    /// Start with the target on the current shaft position
    pub fn new(detents: NonZeroU32, shaft_pos: f64) -> Self {
        Self {
            detents,
            detent_pos: shaft_pos,
            seeking: false,
        }
    }

    pub fn detents(&self) -> NonZeroU32 {
        self.detents
    }

    /// Target shaft position in turns
    pub fn target(&self) -> f64 {
        self.detent_pos
    }

    /// Index of the detent the target sits on, in `0..detents`
    pub fn pos(&self) -> u32 {
        let n = f64::from(self.detents.get());
        wrap_pos((self.detent_pos * n).round(), self.detents) as u32
    }

    pub fn state(&self) -> DisplayState {
        DisplayState::new(self.detents, f64::from(self.pos()))
    }

    fn detent_size(&self) -> f64 {
        1.0 / f64::from(self.detents.get())
    }

    /// Apply a display command. Returns the reply to broadcast, if any.
    pub fn apply(&mut self, message: ClientMessage) -> Option<PeerMessage> {
        match message {
            ClientMessage::GetState => {
                info!("state requested");
                Some(PeerMessage::full_state(&self.state()))
            }
            ClientMessage::SetState { state } => self.set_state(state),
        }
    }

    fn set_state(&mut self, update: PartialDisplayState) -> Option<PeerMessage> {
        if update.is_empty() {
            debug!("empty set_state ignored");
            return None;
        }

        if let Some(detents) = update.detents {
            self.detents = detents;
            let n = f64::from(detents.get());
            self.detent_pos = (self.detent_pos * n).round() / n;
        }

        if let Some(pos) = update.pos {
            // Stay within the current turn so the shaft never spins a full
            // revolution to reach a detent
            let turn = self.detent_pos.floor();
            let index = wrap_pos(pos.round(), self.detents);
            let target = turn + index * self.detent_size();
            if target != self.detent_pos {
                self.detent_pos = target;
                self.seeking = true;
            }
        }

        info!("n pos = {} / {}", self.pos(), self.detents);
        Some(PeerMessage::full_state(&self.state()))
    }

    /// Feed the latest shaft reading. Moves the target one detent toward the
    /// shaft once it is more than `SNAP_START` of a detent away and reports
    /// the new position.
    pub fn observe(&mut self, shaft_pos: f64) -> Option<PeerMessage> {
        let detent_size = self.detent_size();
        let moved_frac = (shaft_pos - self.detent_pos).abs() / detent_size;

        if self.seeking {
            if moved_frac <= SNAP_START {
                debug!("reached target {:.3}", self.detent_pos);
                self.seeking = false;
            }
            return None;
        }

        if moved_frac <= SNAP_START {
            return None;
        }

        if shaft_pos > self.detent_pos {
            self.detent_pos += detent_size;
        } else {
            self.detent_pos -= detent_size;
        }

        let pos = self.pos();
        debug!("r pos = {}", pos);
        Some(PeerMessage::State {
            state: PartialDisplayState::pos(f64::from(pos)),
        })
    }

    /// Motor command that holds the current target
    pub fn motor_command(&self) -> MotorCommand {
        MotorCommand::hold(self.detent_pos)
    }
}
