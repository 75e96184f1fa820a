//! Display-side sync client
//!
//! Holds the local dial state, one WebSocket to the controller peer, and the
//! event loop that serves both. Everything runs on a single task: a handler
//! finishes before the next frame or UI command is looked at, so the state
//! needs no locking.
//!
//! Conflict handling is last-write-wins in both directions. There is no
//! retry, reconnect or heartbeat.

pub mod connection;
pub mod session;

pub use connection::PeerLink;
pub use session::{ConnectionStatus, DialSession, RemoteOutcome};

use std::num::NonZeroU32;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::dial::{DialView, DisplayState, PartialDisplayState};
use crate::protocol::ClientMessage;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid peer address {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported scheme {0:?} (expected ws or wss)")]
    UnsupportedScheme(String),

    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    #[error("failed to send to peer: {0}")]
    Send(#[source] Box<tokio_tungstenite::tungstenite::Error>),
}

/// Input from the UI root
#[derive(Debug, Clone, PartialEq)]
pub enum DialCommand {
    /// Merge an edit, optionally pushing the result to the peer
    Update {
        update: PartialDisplayState,
        transmit: bool,
    },
    /// Raw slider value in `0..=detents`
    Slide(f64),
    /// Preset button
    Preset(NonZeroU32),
}

enum LoopEvent {
    Command(Option<DialCommand>),
    Frame(Option<String>),
}

/// Connection object owned by the UI root
pub struct SyncClient {
    url: String,
    session: DialSession,
    link: Option<PeerLink>,
    bus: SharedBus,
}

impl SyncClient {
    pub fn new(url: impl Into<String>, initial: DisplayState, bus: SharedBus) -> Self {
        Self {
            url: url.into(),
            session: DialSession::new(initial),
            link: None,
            bus,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> &DisplayState {
        self.session.state()
    }

    pub fn view(&self) -> DialView {
        DialView::from_state(self.session.state())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.session.status()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Open the channel and request the peer's state.
    ///
    /// On failure the error is logged and returned; the client stays
    /// disconnected and local edits keep working.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.link.is_some() {
            debug!("Already connected to {}", self.url);
            return Ok(());
        }

        let link = match PeerLink::open(&self.url).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Failed to connect to peer: {}", e);
                return Err(e);
            }
        };

        info!("Connected to peer {}", self.url);
        self.link = Some(link);
        let greeting = self.session.on_open();
        self.bus.publish(BusEvent::PeerConnected {
            url: self.url.clone(),
        });
        self.transmit(&greeting).await;
        Ok(())
    }

    /// Publish the current view for the front end.
    pub fn render(&self) {
        self.bus.publish(BusEvent::DialRendered { view: self.view() });
    }

    /// Merge a local edit, re-render, and push it to the peer if `transmit`.
    pub async fn local_update(&mut self, update: PartialDisplayState, transmit: bool) {
        let outgoing = self.session.local_update(update, transmit);
        self.render();
        if let Some(message) = outgoing {
            self.transmit(&message).await;
        }
    }

    /// Raw slider input; mirrored and transmitted.
    pub async fn slide_to(&mut self, e: f64) {
        let message = self.session.slide_to(e);
        self.render();
        self.transmit(&message).await;
    }

    pub async fn select_preset(&mut self, detents: NonZeroU32) {
        self.local_update(PartialDisplayState::detents(detents), true)
            .await;
    }

    /// Handle one inbound frame. Bad frames are logged and dropped.
    pub fn on_remote_message(&mut self, raw: &str) -> RemoteOutcome {
        let outcome = self.session.on_remote_message(raw);
        if outcome.changed_state() {
            self.render();
        }
        outcome
    }

    /// Serve UI commands and peer frames until the command channel closes.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<DialCommand>) {
        loop {
            let event = {
                let link = &mut self.link;
                tokio::select! {
                    command = commands.recv() => LoopEvent::Command(command),
                    frame = next_frame(link) => LoopEvent::Frame(frame),
                }
            };

            match event {
                LoopEvent::Command(Some(command)) => self.handle_command(command).await,
                LoopEvent::Command(None) => {
                    debug!("UI command channel closed, leaving event loop");
                    break;
                }
                LoopEvent::Frame(Some(raw)) => {
                    self.on_remote_message(&raw);
                }
                LoopEvent::Frame(None) => {
                    warn!("Lost channel to peer {}; not reconnecting", self.url);
                    self.link = None;
                    self.bus.publish(BusEvent::PeerClosed {
                        url: self.url.clone(),
                    });
                }
            }
        }
    }

    /// Close the channel. The client is consumed.
    pub async fn shutdown(mut self) {
        if let Some(link) = self.link.take() {
            info!("Closing channel to {}", link.url());
            link.close().await;
        }
    }

    async fn handle_command(&mut self, command: DialCommand) {
        match command {
            DialCommand::Update { update, transmit } => self.local_update(update, transmit).await,
            DialCommand::Slide(e) => self.slide_to(e).await,
            DialCommand::Preset(detents) => self.select_preset(detents).await,
        }
    }

    /// Fire-and-forget send; failures are logged only.
    async fn transmit(&mut self, message: &ClientMessage) {
        let Some(link) = self.link.as_mut() else {
            debug!("Not connected, not sending {:?}", message);
            return;
        };

        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        debug!("S > {}", text);
        if let Err(e) = link.send_text(text).await {
            warn!("{}", e);
        }
    }
}

async fn next_frame(link: &mut Option<PeerLink>) -> Option<String> {
    match link {
        Some(link) => link.next_text().await,
        None => std::future::pending().await,
    }
}
