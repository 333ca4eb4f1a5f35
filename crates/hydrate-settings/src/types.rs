//! Settings types.
//!
//! Every struct is `#[serde(default)]` so a settings file only needs the keys
//! it wants to change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Broadcast scheduler settings.
    pub scheduler: SchedulerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl GatewaySettings {
    /// Reject combinations that parse but cannot run.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be at least 1".into(),
            ));
        }
        if s.heartbeat_timeout_secs < s.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutSecs ({}) is shorter than server.heartbeatIntervalSecs ({})",
                s.heartbeat_timeout_secs, s.heartbeat_interval_secs
            )));
        }
        if s.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if s.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".into(),
            ));
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "scheduler.tickIntervalMs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Network and per-connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Upgrades beyond this many live sessions are refused.
    pub max_connections: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence after which a client is considered gone.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's broadcast queue.
    pub send_queue_capacity: usize,
    /// How long shutdown waits for tasks before giving up.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_connections: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            send_queue_capacity: 64,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Broadcast scheduler settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSettings {
    /// Run the even-minute reminder at all.
    pub enabled: bool,
    /// Milliseconds between global ticks.
    pub tick_interval_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_ms: 1000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`RUST_LOG` still wins).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-target level overrides, e.g. `{"hydrate_server": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
