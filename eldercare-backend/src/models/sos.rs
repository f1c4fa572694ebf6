use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SosStatus {
    Pending,
    Accepted,
    Resolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct SosRecord {
    pub id: i64,
    pub user_id: i64,
    pub task_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub description: String,
    pub severity: String,
    pub status: SosStatus,
    pub timeout_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Emergency request body
#[derive(Debug, Clone, Deserialize)]
pub struct NewSos {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Option<String>,
}

impl NewSos {
    pub fn severity_or_default(&self) -> &str {
        match self.severity.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => "high",
        }
    }
}

/// Why an SOS state change was refused
#[derive(Debug, Error)]
pub enum SosError {
    #[error("sos not found")]
    NotFound,
    #[error("sos is no longer pending")]
    NotPending,
    #[error("sos already resolved")]
    AlreadyResolved,
    #[error("only the requester or the responder may resolve")]
    NotParticipant,
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}
