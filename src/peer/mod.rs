//! Knob controller peer
//!
//! The peer owns the authoritative detent state. One control-loop task owns
//! the controller and the knob; display sockets hand it commands over a
//! bounded channel and receive its replies through the event bus.
//!
//! ```text
//! display ──text──▶ socket task ──mpsc──▶ control loop ──▶ knob
//! display ◀─text─── socket task ◀──bus─── control loop
//! ```

pub mod controller;
pub mod knob;
pub mod server;

pub use controller::{DetentController, MotorCommand};
pub use knob::{Knob, SimulatedKnob};
pub use server::{router, serve, PeerState};

use anyhow::Result;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::config::PeerConfig;
use crate::dial::DisplayState;
use crate::protocol::{ClientMessage, PeerMessage};

/// Queue depth between socket tasks and the control loop
const INBOX_CAPACITY: usize = 64;

/// Control loop timing and starting detent count
#[derive(Debug, Clone)]
pub struct PeerSettings {
    pub detents: NonZeroU32,
    pub tick: Duration,
    pub settle: Duration,
}

impl From<&PeerConfig> for PeerSettings {
    fn from(config: &PeerConfig) -> Self {
        Self {
            detents: config.detents,
            tick: Duration::from_millis(config.tick_ms.max(1)),
            settle: Duration::from_millis(config.settle_ms),
        }
    }
}

/// Spawn the control loop. Returns the state the WebSocket server needs and
/// the loop's join handle.
pub fn spawn(
    settings: PeerSettings,
    knob: Arc<dyn Knob>,
    bus: SharedBus,
    shutdown: CancellationToken,
) -> (PeerState, JoinHandle<Result<()>>) {
    let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
    let snapshot = Arc::new(RwLock::new(DisplayState::new(settings.detents, 0.0)));

    let control = ControlLoop {
        settings,
        knob,
        bus: bus.clone(),
        snapshot: snapshot.clone(),
    };
    let handle = tokio::spawn(control.run(inbox_rx, shutdown));

    (PeerState::new(inbox_tx, bus, snapshot), handle)
}

struct ControlLoop {
    settings: PeerSettings,
    knob: Arc<dyn Knob>,
    bus: SharedBus,
    snapshot: Arc<RwLock<DisplayState>>,
}

impl ControlLoop {
    async fn run(
        self,
        inbox: mpsc::Receiver<ClientMessage>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let result = self.run_inner(inbox, &shutdown).await;

        if let Err(e) = &result {
            error!("Control loop failed: {}", e);
        }
        info!("Stopping {} knob...", self.knob.name());
        if let Err(e) = self.knob.stop().await {
            warn!("Failed to stop knob: {}", e);
        }
        result
    }

    async fn run_inner(
        &self,
        mut inbox: mpsc::Receiver<ClientMessage>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let tick = self.settings.tick;

        tokio::select! {
            result = self.initialize() => result?,
            _ = shutdown.cancelled() => return Ok(()),
        }

        let mut cur_pos = self.knob.position().await?;
        let mut controller = DetentController::new(self.settings.detents, cur_pos);
        self.publish_snapshot(&controller).await;
        info!(
            "Control loop running: {} detents, tick {:?}",
            controller.detents(),
            tick
        );

        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Control loop cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            // Drain display commands without blocking the motor
            while let Ok(message) = inbox.try_recv() {
                if let Some(reply) = controller.apply(message) {
                    self.broadcast(&controller, reply).await;
                }
            }

            if let Some(reply) = controller.observe(cur_pos) {
                self.broadcast(&controller, reply).await;
            }

            cur_pos = self.knob.command(controller.motor_command()).await?;
        }
    }

    async fn initialize(&self) -> Result<()> {
        knob::home(self.knob.as_ref(), self.settings.tick).await?;
        knob::hold(
            self.knob.as_ref(),
            0.0,
            self.settings.settle,
            self.settings.tick,
        )
        .await
    }

    async fn publish_snapshot(&self, controller: &DetentController) {
        *self.snapshot.write().await = controller.state();
    }

    async fn broadcast(&self, controller: &DetentController, message: PeerMessage) {
        self.publish_snapshot(controller).await;
        if self.bus.subscriber_count() == 0 {
            debug!("send: no displays connected");
        }
        debug!("S > {:?}", message);
        self.bus.publish(BusEvent::StateBroadcast { message });
    }
}
