use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalSettings {
    pub server: ServerSettings,
    pub connections: ConnectionSettings,
    pub logging: LoggingSettings,
}

impl SignalSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.wsPath must start with '/': {}",
                self.server.ws_path
            )));
        }
        if self.server.ws_path == "/health" {
            return Err(SettingsError::InvalidValue(
                "server.wsPath collides with /health".into(),
            ));
        }
        if self.connections.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "connections.sendQueueCapacity must be > 0".into(),
            ));
        }
        if self.connections.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "connections.heartbeatIntervalSecs must be > 0".into(),
            ));
        }
        if self.connections.client_timeout_secs <= self.connections.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "connections.clientTimeoutSecs must exceed heartbeatIntervalSecs".into(),
            ));
        }
        if self.connections.cleanup_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "connections.cleanupIntervalSecs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Network settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Path of the WebSocket upgrade route.
    pub ws_path: String,
    /// CORS origins. Empty means permissive.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            ws_path: "/ws".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// What to do when a connection's outbound queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Close the slow connection.
    Disconnect,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "drop_oldest" => Ok(Self::DropOldest),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown overflow policy: {other}"
            ))),
        }
    }
}

/// Per-connection delivery and liveness settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Bounded outbound queue size per connection.
    pub send_queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Ping cadence.
    pub heartbeat_interval_secs: u64,
    /// A connection with no pong for this long is closed.
    pub client_timeout_secs: u64,
    /// How often the liveness sweep runs.
    pub cleanup_interval_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            cleanup_interval_secs: 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level. `RUST_LOG` wins when set.
    pub level: String,
    /// JSON lines on stdout instead of the human formatter.
    pub json: bool,
    /// Per-module overrides, e.g. `ridesignal_server::router` => `debug`.
    pub module_levels: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            module_levels: BTreeMap::new(),
        }
    }
}
