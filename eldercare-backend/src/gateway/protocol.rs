use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ChatMessage, MessageKind};

/// Longest accepted message body, in characters
pub const MAX_CONTENT_CHARS: usize = 4096;

/// Chat frame sent by a client.
/// Only the recipient, body and kind are read; any `id`, `from` or `time`
/// the client includes is ignored and re-stamped by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientFrame {
    pub to: i64,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid recipient {0}")]
    InvalidRecipient(i64),
    #[error("empty content")]
    EmptyContent,
    #[error("content too long ({0} chars)")]
    ContentTooLong(usize),
}

impl ClientFrame {
    /// Decode and validate a text frame
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: ClientFrame = serde_json::from_str(text)?;

        if frame.to <= 0 {
            return Err(FrameError::InvalidRecipient(frame.to));
        }
        if frame.content.trim().is_empty() {
            return Err(FrameError::EmptyContent);
        }
        let chars = frame.content.chars().count();
        if chars > MAX_CONTENT_CHARS {
            return Err(FrameError::ContentTooLong(chars));
        }

        Ok(frame)
    }
}

/// Pushed to nearby helpers when someone raises an SOS
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SosAlert {
    pub sos_id: i64,
    pub task_id: i64,
    pub user_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub description: String,
    pub severity: String,
    /// Meters from the recipient's last known position
    pub distance: f64,
    pub timeout_at: DateTime<Utc>,
}

/// Pushed to a user's contacts when their position changes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationUpdated {
    pub account_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub time: DateTime<Utc>,
}

/// Every frame the server writes to a socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    Message(ChatMessage),
    SosAlert(SosAlert),
    LocationUpdated(LocationUpdated),
}

impl ServerFrame {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::SosAlert(_) => "sos_alert",
            Self::LocationUpdated(_) => "location_updated",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now_utc;

    #[test]
    fn test_parse_ignores_client_stamps() {
        let frame = ClientFrame::parse(r#"{"id":999,"from":7,"time":"yesterday","to":2,"content":"hi"}"#).unwrap();
        assert_eq!(frame.to, 2);
        assert_eq!(frame.content, "hi");
        assert_eq!(frame.kind, MessageKind::Text);

        let image = ClientFrame::parse(r#"{"to":2,"content":"https://x/y.png","kind":"image"}"#).unwrap();
        assert_eq!(image.kind, MessageKind::Image);
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        assert!(matches!(ClientFrame::parse("not json"), Err(FrameError::Malformed(_))));
        assert!(matches!(ClientFrame::parse(r#"{"content":"hi"}"#), Err(FrameError::Malformed(_))));
        assert!(matches!(
            ClientFrame::parse(r#"{"to":0,"content":"hi"}"#),
            Err(FrameError::InvalidRecipient(0))
        ));
        assert!(matches!(
            ClientFrame::parse(r#"{"to":2,"content":"   "}"#),
            Err(FrameError::EmptyContent)
        ));
        assert!(matches!(
            ClientFrame::parse(r#"{"to":2,"content":"hi","kind":"video"}"#),
            Err(FrameError::Malformed(_))
        ));

        let long = format!(r#"{{"to":2,"content":"{}"}}"#, "a".repeat(MAX_CONTENT_CHARS + 1));
        assert!(matches!(ClientFrame::parse(&long), Err(FrameError::ContentTooLong(_))));
    }

    #[test]
    fn test_server_frames_are_tagged() {
        let message = ChatMessage {
            id: 3,
            from: 1,
            to: 2,
            content: "hello".into(),
            kind: MessageKind::Text,
            time: now_utc(),
        };
        let json: serde_json::Value = serde_json::from_str(&ServerFrame::Message(message).to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["data"]["id"], 3);
        assert_eq!(json["data"]["kind"], "text");

        let update = ServerFrame::LocationUpdated(LocationUpdated {
            account_id: 1,
            latitude: 31.0,
            longitude: 121.0,
            address: String::new(),
            time: now_utc(),
        });
        assert_eq!(update.event_name(), "location_updated");
        let json: serde_json::Value = serde_json::from_str(&update.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "location_updated");
        assert_eq!(json["data"]["account_id"], 1);
    }
}
