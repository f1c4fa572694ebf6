use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use super::AccountProfile;
use crate::proximity::{GeoPoint, Located};

/// Category given to tasks created by an SOS
pub const EMERGENCY_CATEGORY: &str = "emergency";
pub const DEFAULT_CATEGORY: &str = "other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Completed,
    Cancelled,
}

/// Help request
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub creator_id: i64,
    pub assignee_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: TaskStatus,
    pub reward: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_emergency(&self) -> bool {
        self.category == EMERGENCY_CATEGORY
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

impl Located for Task {
    fn position(&self) -> Option<GeoPoint> {
        Some(self.location())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub reward: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn category_or_default(&self) -> &str {
        match self.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => DEFAULT_CATEGORY,
        }
    }
}

/// Pending task with its distance from the searcher
#[derive(Debug, Clone, Serialize)]
pub struct NearbyTask {
    #[serde(flatten)]
    pub task: Task,
    pub distance: f64,
    pub is_emergency: bool,
}

/// Candidate helper for a task, nearest first
#[derive(Debug, Clone, Serialize)]
pub struct VolunteerMatch {
    pub account: AccountProfile,
    pub distance: f64,
    pub match_score: f64,
}

/// Why a task state change was refused
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task not found")]
    NotFound,
    #[error("cannot accept your own task")]
    OwnTask,
    #[error("task is {0}, expected {1}")]
    InvalidState(TaskStatus, TaskStatus),
    #[error("only the creator or the assignee may do this")]
    NotParticipant,
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}
