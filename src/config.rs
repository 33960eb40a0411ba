//! Server configuration
//!
//! Loaded from a TOML file at startup. Every field has a default, so the
//! server runs without any configuration file.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signaling::{DEFAULT_ROOM_CAPACITY, DEFAULT_SIGNALING_PORT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub rooms: RoomSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address for WebSocket connections
    pub bind_addr: String,
    pub ping_interval_secs: u64,
    /// How long to wait for a pong before dropping the client
    pub pong_timeout_secs: u64,
    /// Larger text frames are rejected
    pub max_message_bytes: usize,
    /// Capacity of the coordinator command queue
    pub command_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_SIGNALING_PORT),
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
            max_message_bytes: 64 * 1024,
            command_buffer: 1024,
        }
    }
}

impl ServerSettings {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    /// Frame and message cap handed to the WebSocket layer. Text between
    /// `max_message_bytes` and this limit still gets an `invalid_message`
    /// reply; anything larger is refused while reading and drops the connection.
    pub fn transport_limit(&self) -> usize {
        self.max_message_bytes.saturating_mul(2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    /// Maximum members per room
    pub capacity: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ROOM_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace/debug/info/warn/error, or a full filter directive
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Config {
    /// Load and validate the config at `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                path: path_str,
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path_str, "Config file not found, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path_str,
                    source,
                });
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };

        self.server
            .bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| invalid("server.bind_addr", &e.to_string()))?;
        if self.server.ping_interval_secs == 0 {
            return Err(invalid("server.ping_interval_secs", "must be positive"));
        }
        if self.server.pong_timeout_secs == 0 {
            return Err(invalid("server.pong_timeout_secs", "must be positive"));
        }
        if self.server.max_message_bytes == 0 {
            return Err(invalid("server.max_message_bytes", "must be positive"));
        }
        if self.server.command_buffer == 0 {
            return Err(invalid("server.command_buffer", "must be positive"));
        }
        if self.rooms.capacity == 0 {
            return Err(invalid("rooms.capacity", "a room must admit at least one client"));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(invalid("logging.format", "expected \"text\" or \"json\""));
        }
        Ok(())
    }
}
