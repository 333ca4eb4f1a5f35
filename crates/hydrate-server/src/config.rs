//! Server configuration.

use std::time::Duration;

use hydrate_settings::GatewaySettings;

/// Runtime configuration for the gateway server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Upgrades are refused once this many sessions are live.
    pub max_connections: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Silence after which a client is considered gone.
    pub heartbeat_timeout: Duration,
    /// Max inbound `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Per-connection broadcast queue capacity.
    pub send_queue_capacity: usize,
    /// Whether the hydration reminder scheduler runs.
    pub scheduler_enabled: bool,
    /// Interval between scheduler ticks.
    pub tick_interval: Duration,
    /// How long shutdown waits for tasks.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            max_message_size: 64 * 1024,
            send_queue_capacity: 64,
            scheduler_enabled: true,
            tick_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&GatewaySettings> for ServerConfig {
    fn from(settings: &GatewaySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            heartbeat_interval: Duration::from_secs(server.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(server.heartbeat_timeout_secs),
            max_message_size: server.max_message_size,
            send_queue_capacity: server.send_queue_capacity,
            scheduler_enabled: settings.scheduler.enabled,
            tick_interval: Duration::from_millis(settings.scheduler.tick_interval_ms),
            shutdown_timeout: Duration::from_secs(server.shutdown_timeout_secs),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
