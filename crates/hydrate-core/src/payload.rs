//! Wire payloads.
//!
//! Inbound: `{ "text": string }`, extra fields ignored.
//! Outbound: `{ "sender": "bot" | "system", "text": string }`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{GatewayError, Result};

/// Text of the one-time greeting sent when a connection opens.
pub const GREETING: &str = "Connected to server";

/// A well-formed message from a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// A chat line.
    Chat(String),
}

impl ClientMessage {
    /// Parse a raw text frame.
    ///
    /// Anything that is not a JSON object with a string `text` field is a
    /// [`GatewayError::Protocol`].
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| GatewayError::Protocol(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(GatewayError::Protocol("expected a JSON object".into()));
        };
        match fields.remove("text") {
            Some(Value::String(text)) => Ok(Self::Chat(text)),
            Some(_) => Err(GatewayError::Protocol("field `text` must be a string".into())),
            None => Err(GatewayError::Protocol("missing field `text`".into())),
        }
    }
}

/// Who a server message is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    /// Replies and reminders.
    Bot,
    /// Connection lifecycle notices.
    System,
}

/// A message pushed to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Attribution.
    pub sender: SenderKind,
    /// Display text.
    pub text: String,
}

impl ServerMessage {
    /// The greeting sent once when a connection opens.
    pub fn greeting() -> Self {
        Self {
            sender: SenderKind::System,
            text: GREETING.to_owned(),
        }
    }

    /// Placeholder reply to a chat line received at `at`.
    pub fn reply(text: &str, at: NaiveDateTime) -> Self {
        Self {
            sender: SenderKind::Bot,
            text: format!("{text} rcvd at {} (dummy reply)", at.format("%H:%M:%S")),
        }
    }

    /// The even-minute reminder for the minute containing `at`.
    pub fn hydration_reminder(at: NaiveDateTime) -> Self {
        Self {
            sender: SenderKind::Bot,
            text: format!("Remember to stay hydrated! It's {}", at.format("%H:%M")),
        }
    }

    /// Serialize to the JSON text frame sent on the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn parse_chat() {
        let msg = ClientMessage::parse(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Chat("hello".into()));
    }

    #[test]
    fn parse_ignores_extra_fields() {
        let msg = ClientMessage::parse(r#"{"text":"hi","sender":"user","id":7}"#).unwrap();
        assert_eq!(msg, ClientMessage::Chat("hi".into()));
    }

    #[test]
    fn parse_empty_text_is_valid() {
        let msg = ClientMessage::parse(r#"{"text":""}"#).unwrap();
        assert_eq!(msg, ClientMessage::Chat(String::new()));
    }

    #[test]
    fn parse_missing_text_is_protocol_error() {
        let err = ClientMessage::parse(r#"{"message":"hello"}"#).unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
        assert!(err.to_string().contains("text"));
    }

    #[test]
    fn parse_non_string_text_is_protocol_error() {
        let err = ClientMessage::parse(r#"{"text":42}"#).unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[test]
    fn parse_invalid_json_is_protocol_error() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(GatewayError::Protocol(_))
        ));
    }

    #[test]
    fn parse_non_object_is_protocol_error() {
        for raw in [r#"["hi"]"#, r#""hi""#, "42", "null", "true"] {
            assert!(
                matches!(ClientMessage::parse(raw), Err(GatewayError::Protocol(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn greeting_is_system() {
        let msg = ServerMessage::greeting();
        assert_eq!(msg.sender, SenderKind::System);
        assert_eq!(msg.text, "Connected to server");
    }

    #[test]
    fn reply_zero_pads_time() {
        let msg = ServerMessage::reply("ping", at(7, 5, 9));
        assert_eq!(msg.sender, SenderKind::Bot);
        assert_eq!(msg.text, "ping rcvd at 07:05:09 (dummy reply)");
    }

    #[test]
    fn reply_uses_24_hour_clock() {
        let msg = ServerMessage::reply("late", at(23, 59, 1));
        assert_eq!(msg.text, "late rcvd at 23:59:01 (dummy reply)");
    }

    #[test]
    fn reminder_renders_hour_minute() {
        let msg = ServerMessage::hydration_reminder(at(14, 2, 0));
        assert_eq!(msg.sender, SenderKind::Bot);
        assert_eq!(msg.text, "Remember to stay hydrated! It's 14:02");
    }

    #[test]
    fn wire_format() {
        let json = ServerMessage::greeting().to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["sender"], "system");
        assert_eq!(parsed["text"], "Connected to server");

        let json = ServerMessage::reply("x", at(1, 2, 3)).to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["sender"], "bot");
    }
}
