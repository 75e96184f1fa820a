//! Configuration management
//!
//! Precedence: environment (`DETENTS_*`) > `config.{toml,json,...}` in the
//! config dir > built-in defaults.

use anyhow::Result;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::path::PathBuf;

use crate::dial::DEFAULT_DETENTS;

/// Peer address the display talks to unless configured otherwise
pub const DEFAULT_PEER_URL: &str = "ws://192.168.0.146:8765";

/// Environment prefix for all settings
const ENV_PREFIX: &str = "DETENTS";

#[derive(Debug, Deserialize)]
pub struct Config {
    /// WebSocket address of the knob controller peer
    #[serde(default = "default_peer_url")]
    pub peer_url: String,

    #[serde(default)]
    pub dial: DialConfig,

    #[serde(default)]
    pub peer: PeerConfig,
}

fn default_peer_url() -> String {
    DEFAULT_PEER_URL.to_string()
}

/// Display-side settings
#[derive(Debug, Deserialize)]
pub struct DialConfig {
    /// Detent count shown before the peer reports its own
    #[serde(default = "default_dial_detents")]
    pub detents: NonZeroU32,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            detents: default_dial_detents(),
        }
    }
}

fn default_dial_detents() -> NonZeroU32 {
    DEFAULT_DETENTS
}

/// Controller peer settings
#[derive(Debug, Deserialize)]
pub struct PeerConfig {
    #[serde(default = "default_peer_port")]
    pub port: u16,

    /// Detent count the knob starts with
    #[serde(default = "default_peer_detents")]
    pub detents: NonZeroU32,

    /// Control loop period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// How long to hold position after homing, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            port: default_peer_port(),
            detents: default_peer_detents(),
            tick_ms: default_tick_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_peer_port() -> u16 {
    8765
}

fn default_peer_detents() -> NonZeroU32 {
    NonZeroU32::new(8).unwrap_or(DEFAULT_DETENTS)
}

fn default_tick_ms() -> u64 {
    1
}

fn default_settle_ms() -> u64 {
    500
}

/// Get config directory (DETENTS_CONFIG_DIR, XDG_CONFIG_HOME or ~/.config)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DETENTS_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("virtual-detents");
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("virtual-detents");
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config/virtual-detents");
    }

    // Fallback to current directory
    PathBuf::from(".")
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let mut builder = ::config::Config::builder()
        .set_default("peer_url", DEFAULT_PEER_URL)?
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // Override with environment variables (DETENTS_PEER_URL, DETENTS_PEER__PORT, etc.)
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    // Legacy PORT fallback for the peer; DETENTS_PEER__PORT wins when both are set
    if std::env::var("DETENTS_PEER__PORT").is_err() {
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port_num) = port.parse::<u16>() {
                builder = builder.set_override("peer.port", port_num as i64)?;
            }
        }
    }

    let config = builder.build()?;

    Ok(config.try_deserialize()?)
}
