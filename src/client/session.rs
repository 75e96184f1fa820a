//! Socket-free core of the display client.
//!
//! `DialSession` owns the local `DisplayState` and the connection flag. It
//! decides what changes and what would go on the wire; the caller does the
//! actual sending and rendering.

use tracing::{debug, info, warn};

use crate::dial::{merge, slider_to_pos, DisplayState, PartialDisplayState};
use crate::protocol::{ClientMessage, PeerMessage, ProtocolError};

/// Connection lifecycle. There is no way back from `Connected`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

/// What happened to an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// `state` merged into the local copy
    StateApplied,
    /// `settings` applied (detent count only)
    SettingsApplied,
    /// Valid JSON the display doesn't act on (unknown or missing type)
    Ignored { kind: Option<String> },
    /// Not JSON, or a known type with a bad payload
    Dropped { reason: String },
}

impl RemoteOutcome {
    /// Whether the local state may have changed and needs a re-render
    pub fn changed_state(&self) -> bool {
        matches!(self, Self::StateApplied | Self::SettingsApplied)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DialSession {
    state: DisplayState,
    status: ConnectionStatus,
}

impl DialSession {
    pub fn new(state: DisplayState) -> Self {
        Self {
            state,
            status: ConnectionStatus::Disconnected,
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Mark the channel open and return the greeting to send.
    pub fn on_open(&mut self) -> ClientMessage {
        self.status = ConnectionStatus::Connected;
        ClientMessage::GetState
    }

    /// Merge a local edit. Returns the `set_state` to send when `transmit`
    /// is set.
    pub fn local_update(
        &mut self,
        update: PartialDisplayState,
        transmit: bool,
    ) -> Option<ClientMessage> {
        self.state = merge(self.state, update).normalized();
        if transmit {
            debug!("> STATE {:?}", self.state);
            Some(ClientMessage::set_state(&self.state))
        } else {
            debug!("+ STATE {:?}", self.state);
            None
        }
    }

    /// Raw slider input: mirrored into a dial position, then transmitted.
    pub fn slide_to(&mut self, e: f64) -> ClientMessage {
        let pos = slider_to_pos(e, self.state.detents);
        self.state = merge(self.state, PartialDisplayState::pos(pos)).normalized();
        debug!("> STATE {:?}", self.state);
        ClientMessage::set_state(&self.state)
    }

    /// Handle a raw inbound frame. Never fails; problems are logged.
    pub fn on_remote_message(&mut self, raw: &str) -> RemoteOutcome {
        match PeerMessage::decode(raw) {
            Ok(message) => self.apply(message),
            Err(ProtocolError::UnknownType(kind)) => {
                info!("unknown message type {:?}: {}", kind, raw);
                RemoteOutcome::Ignored { kind: Some(kind) }
            }
            Err(ProtocolError::MissingType) => {
                info!("unknown message (no type tag): {}", raw);
                RemoteOutcome::Ignored { kind: None }
            }
            Err(e) => {
                warn!("Invalid peer message {:?}: {}", raw, e);
                RemoteOutcome::Dropped {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Apply an already-decoded peer message. Nothing is echoed back.
    pub fn apply(&mut self, message: PeerMessage) -> RemoteOutcome {
        match message {
            PeerMessage::State { state } => {
                debug!("< STATE {:?}", state);
                self.state = merge(self.state, state).normalized();
                RemoteOutcome::StateApplied
            }
            PeerMessage::Settings { settings } => {
                debug!("< SETTINGS {:?}", settings);
                self.state =
                    merge(self.state, PartialDisplayState::detents(settings.detents)).normalized();
                RemoteOutcome::SettingsApplied
            }
        }
    }
}
