//! Wire protocol between the display and the knob controller peer.
//!
//! Every frame is a JSON object carrying a `type` tag (protocol v1):
//!
//! ```text
//! display -> peer   {"type":"get_state"}
//! display -> peer   {"type":"set_state","state":{"detents":8,"pos":0.0}}
//! peer -> display   {"type":"state","state":{"pos":3}}
//! peer -> display   {"type":"settings","settings":{"detents":16}}
//! ```
//!
//! Untyped frames (e.g. a bare `{"detents":8}`) are not part of the protocol
//! and decode to [`ProtocolError::MissingType`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use thiserror::Error;

use crate::dial::{DisplayState, PartialDisplayState};

/// Current protocol revision, reported by the peer's `/status`
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("message has no \"type\" tag")]
    MissingType,

    #[error("unknown message type \"{0}\"")]
    UnknownType(String),

    #[error("invalid \"{kind}\" payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Messages sent by the display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the peer for its full state
    GetState,
    /// Push a new state to the peer. Displays always send the full state;
    /// the peer accepts partials.
    SetState { state: PartialDisplayState },
}

impl ClientMessage {
    const TYPES: &'static [&'static str] = &["get_state", "set_state"];

    /// `set_state` carrying `state` reduced modulo its detent count
    pub fn set_state(state: &DisplayState) -> Self {
        Self::SetState {
            state: state.normalized().into(),
        }
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        decode_tagged(raw, Self::TYPES)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// Settings subset pushed by the peer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub detents: NonZeroU32,
}

/// Messages sent by the peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// Full or partial state, merged into the display's copy
    State { state: PartialDisplayState },
    /// Settings change; only touches `detents`
    Settings { settings: Settings },
}

impl PeerMessage {
    const TYPES: &'static [&'static str] = &["state", "settings"];

    pub fn full_state(state: &DisplayState) -> Self {
        Self::State {
            state: state.normalized().into(),
        }
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        decode_tagged(raw, Self::TYPES)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Tag of this message as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::State { .. } => "state",
            Self::Settings { .. } => "settings",
        }
    }
}

fn type_tag(value: &Value) -> Result<&str, ProtocolError> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)
}

/// Parse, check the tag against `known`, then deserialize the payload.
///
/// Splitting the steps keeps "not JSON", "unknown type" and "bad payload"
/// apart so callers can log them differently.
fn decode_tagged<T>(raw: &str, known: &[&str]) -> Result<T, ProtocolError>
where
    T: serde::de::DeserializeOwned,
{
    let value: Value = serde_json::from_str(raw).map_err(ProtocolError::Malformed)?;
    let kind = type_tag(&value)?.to_string();

    if !known.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nz(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn get_state_has_no_payload() {
        let encoded = ClientMessage::GetState.encode().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&encoded).unwrap(),
            json!({"type": "get_state"})
        );
    }

    #[test]
    fn set_state_carries_normalized_full_state() {
        let msg = ClientMessage::set_state(&DisplayState::new(nz(8), 9.0));
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "set_state", "state": {"detents": 8, "pos": 1.0}})
        );
    }

    #[test]
    fn decodes_partial_state_from_peer() {
        let msg = PeerMessage::decode(r#"{"type":"state","state":{"pos":3}}"#).unwrap();
        assert_eq!(
            msg,
            PeerMessage::State {
                state: PartialDisplayState::pos(3.0)
            }
        );
    }

    #[test]
    fn decodes_settings() {
        let msg = PeerMessage::decode(r#"{"type":"settings","settings":{"detents":16}}"#).unwrap();
        assert_eq!(
            msg,
            PeerMessage::Settings {
                settings: Settings { detents: nz(16) }
            }
        );
        assert_eq!(msg.kind(), "settings");
    }

    #[test]
    fn distinguishes_failure_kinds() {
        assert!(matches!(
            PeerMessage::decode("{not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            PeerMessage::decode(r#"{"detents":8}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            PeerMessage::decode(r#"{"type":"set_state","state":{}}"#),
            Err(ProtocolError::UnknownType(kind)) if kind == "set_state"
        ));
        assert!(matches!(
            PeerMessage::decode(r#"{"type":"settings","settings":{"detents":0}}"#),
            Err(ProtocolError::InvalidPayload { kind, .. }) if kind == "settings"
        ));
    }

    #[test]
    fn client_messages_decode_on_peer_side() {
        assert_eq!(
            ClientMessage::decode(r#"{"type":"get_state"}"#).unwrap(),
            ClientMessage::GetState
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":"set_state","state":{"detents":4}}"#).unwrap(),
            ClientMessage::SetState {
                state: PartialDisplayState::detents(nz(4))
            }
        );
    }

    #[test]
    fn non_object_frames_have_no_tag() {
        assert!(matches!(
            PeerMessage::decode("[]"),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            PeerMessage::decode(r#"{"type":7}"#),
            Err(ProtocolError::MissingType)
        ));
    }
}
