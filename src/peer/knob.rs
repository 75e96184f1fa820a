//! Motorized knob abstraction.
//!
//! The controller only needs three things from the hardware: read the shaft,
//! send a position command (which also returns the new reading), and stop.
//! `SimulatedKnob` is the in-process implementation used by the peer binary
//! and the tests.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::controller::{MotorCommand, POS_DIFF};

#[async_trait]
pub trait Knob: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Current shaft position in turns
    async fn position(&self) -> Result<f64>;

    /// Send a position command; returns the shaft position after it
    async fn command(&self, command: MotorCommand) -> Result<f64>;

    /// Release the motor
    async fn stop(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct SimState {
    shaft: f64,
    stopped: bool,
}

/// Knob without hardware: the shaft moves toward the commanded stop position
/// at the commanded velocity, one `step` of simulated time per command.
#[derive(Debug)]
pub struct SimulatedKnob {
    state: Mutex<SimState>,
    step: Duration,
}

impl SimulatedKnob {
    pub fn new(step: Duration) -> Self {
        Self::starting_at(0.0, step)
    }

    pub fn starting_at(shaft: f64, step: Duration) -> Self {
        Self {
            state: Mutex::new(SimState {
                shaft,
                stopped: false,
            }),
            step,
        }
    }

    /// Move the shaft by hand
    pub async fn turn_by(&self, delta: f64) {
        let mut state = self.state.lock().await;
        state.shaft += delta;
    }

    pub async fn shaft(&self) -> f64 {
        self.state.lock().await.shaft
    }

    pub async fn is_stopped(&self) -> bool {
        self.state.lock().await.stopped
    }
}

#[async_trait]
impl Knob for SimulatedKnob {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn position(&self) -> Result<f64> {
        Ok(self.state.lock().await.shaft)
    }

    async fn command(&self, command: MotorCommand) -> Result<f64> {
        let mut state = self.state.lock().await;
        let max_step = command.velocity * self.step.as_secs_f64();
        let diff = command.stop_position - state.shaft;
        state.shaft += diff.clamp(-max_step, max_step);
        state.stopped = false;
        Ok(state.shaft)
    }

    async fn stop(&self) -> Result<()> {
        self.state.lock().await.stopped = true;
        Ok(())
    }
}

/// Stop the motor, then drive slowly to zero.
pub async fn home(knob: &dyn Knob, tick: Duration) -> Result<()> {
    knob.stop().await?;
    let mut cur_pos = knob.position().await?;
    info!("{}: homing from {:.3}", knob.name(), cur_pos);

    while cur_pos.abs() > POS_DIFF {
        cur_pos = knob.command(MotorCommand::home(0.0)).await?;
        tokio::time::sleep(tick).await;
    }

    debug!("{}: homed at {:.3}", knob.name(), cur_pos);
    Ok(())
}

/// Keep commanding `target` for `duration`.
pub async fn hold(knob: &dyn Knob, target: f64, duration: Duration, tick: Duration) -> Result<()> {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        knob.command(MotorCommand::hold(target)).await?;
        tokio::time::sleep(tick).await;
    }
    Ok(())
}
