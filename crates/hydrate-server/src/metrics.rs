//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle `/metrics` renders from. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused at the connection limit (counter).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Connection lifetime (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Well-formed chat messages received (counter).
pub const MESSAGES_RECEIVED_TOTAL: &str = "chat_messages_received_total";
/// Malformed inbound payloads dropped (counter).
pub const PROTOCOL_ERRORS_TOTAL: &str = "chat_protocol_errors_total";
/// Hydration reminder broadcasts fired (counter).
pub const BROADCASTS_TOTAL: &str = "reminder_broadcasts_total";
/// Reminder deliveries that failed (counter, labels: reason).
pub const BROADCAST_DROPS_TOTAL: &str = "reminder_broadcast_drops_total";
