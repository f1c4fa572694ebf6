use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

/// A chat message as stamped by the fan-out loop.
/// Immutable once assigned an id; the id doubles as the persistence key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub from: i64,
    pub to: i64,
    pub content: String,
    pub kind: MessageKind,
    pub time: DateTime<Utc>,
}

impl ChatMessage {
    pub fn is_self_message(&self) -> bool {
        self.from == self.to
    }
}

/// One directed contact row (owner -> counterpart)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactEntry {
    pub account_id: i64,
    pub contact_id: i64,
    pub last_chat_time: DateTime<Utc>,
}

/// Contact row joined with the counterpart's profile
#[derive(Debug, Clone, Serialize)]
pub struct ContactSummary {
    pub contact_id: i64,
    pub nickname: String,
    pub avatar: String,
    pub last_chat_time: DateTime<Utc>,
}

/// Result of applying one relayed message to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOutcome {
    /// False when the message row already existed (redelivery)
    pub message_inserted: bool,
}
