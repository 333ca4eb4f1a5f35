//! Gateway error taxonomy.

use crate::ids::SessionId;

/// Errors raised while serving a connection.
///
/// Every variant is contained to the connection it happened on; nothing here
/// is ever propagated to other connections or to the broadcast scheduler.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Inbound payload was not `{ "text": string }`. The message is dropped
    /// and the connection stays open.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Send or receive against a connection that is gone.
    #[error("transport closed")]
    TransportClosed,
    /// The connection's outbound queue is saturated; the message was dropped.
    #[error("send queue full")]
    SendQueueFull,
    /// A session with this id is already registered. Fatal to the
    /// connection that tried to register it.
    #[error("duplicate session id: {0}")]
    DuplicateId(SessionId),
}

impl GatewayError {
    /// Whether the connection can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::SendQueueFull)
    }

    /// Whether this error means the peer has gone away.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::TransportClosed)
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::TransportClosed => "transport_closed",
            Self::SendQueueFull => "send_queue_full",
            Self::DuplicateId(_) => "duplicate_id",
        }
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(GatewayError::Protocol("missing field `text`".into()).is_recoverable());
        assert!(GatewayError::SendQueueFull.is_recoverable());
        assert!(!GatewayError::TransportClosed.is_recoverable());
        assert!(!GatewayError::DuplicateId(SessionId::from_raw("sess_1")).is_recoverable());
    }

    #[test]
    fn only_transport_closed_is_disconnect() {
        assert!(GatewayError::TransportClosed.is_disconnect());
        assert!(!GatewayError::SendQueueFull.is_disconnect());
        assert!(!GatewayError::Protocol("x".into()).is_disconnect());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(GatewayError::Protocol("x".into()).error_kind(), "protocol");
        assert_eq!(GatewayError::TransportClosed.error_kind(), "transport_closed");
        assert_eq!(GatewayError::SendQueueFull.error_kind(), "send_queue_full");
        assert_eq!(
            GatewayError::DuplicateId(SessionId::from_raw("sess_1")).error_kind(),
            "duplicate_id"
        );
    }

    #[test]
    fn display_includes_detail() {
        let err = GatewayError::DuplicateId(SessionId::from_raw("sess_dup"));
        assert_eq!(err.to_string(), "duplicate session id: sess_dup");
    }
}
