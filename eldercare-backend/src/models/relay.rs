use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RelayStatus {
    /// Appended, not yet acknowledged
    Pending,
    /// Persisted and acknowledged
    Acked,
    /// Gave up after retries; kept for inspection and requeue
    Dead,
}

/// One record in the durable relay log
#[derive(Debug, Clone, Serialize)]
pub struct RelayEntry {
    pub offset: i64,
    pub topic: String,
    pub message_id: i64,
    pub payload: String,
    pub status: RelayStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}
