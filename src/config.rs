//! Coordinator configuration
//!
//! Defaults, optionally overridden by a TOML file, then by environment
//! variables (`P2PSTORAGE_BIND`, `P2PSTORAGE_PORT`, `P2PSTORAGE_MAX_HOSTS`),
//! then by command line flags.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default coordinator port
pub const DEFAULT_PORT: u16 = 7070;

/// Default maximum number of connected hosts
pub const DEFAULT_MAX_HOSTS: usize = 256;

/// Default upper bound on a single message payload (16 MiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Interface to bind
    pub bind: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of simultaneously connected hosts
    pub max_hosts: usize,
    /// Largest payload a peer may announce in a frame header
    pub max_payload_size: u32,
    /// Message returned to every host on a successful connect
    pub broadcast_message: Option<String>,
    /// Seconds a new connection has to complete the handshake
    pub handshake_timeout_secs: Option<u64>,
    /// Seconds an active session may stay silent before it is dropped
    pub idle_timeout_secs: Option<u64>,
    /// Capacity of each session's outbound queue
    pub outbound_queue: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_hosts: DEFAULT_MAX_HOSTS,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            broadcast_message: None,
            handshake_timeout_secs: Some(30),
            idle_timeout_secs: None,
            outbound_queue: 100,
        }
    }
}

impl CoordinatorConfig {
    /// Load from a TOML file; missing keys fall back to defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(data)?)
    }

    /// Apply environment overrides. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("P2PSTORAGE_BIND") {
            if !bind.trim().is_empty() {
                self.bind = bind.trim().to_string();
            }
        }
        if let Ok(s) = std::env::var("P2PSTORAGE_PORT") {
            match s.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => log::warn!("Ignoring invalid P2PSTORAGE_PORT: {}", s),
            }
        }
        if let Ok(s) = std::env::var("P2PSTORAGE_MAX_HOSTS") {
            match s.parse::<usize>() {
                Ok(max) => self.max_hosts = max,
                Err(_) => log::warn!("Ignoring invalid P2PSTORAGE_MAX_HOSTS: {}", s),
            }
        }
    }

    /// `bind:port` string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}
