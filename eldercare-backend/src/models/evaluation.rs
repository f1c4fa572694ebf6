use chrono::{DateTime, Utc};
use serde::Serialize;

pub const MIN_SCORE: i64 = 1;
pub const MAX_SCORE: i64 = 5;

/// Running rating of an account, one row per account
#[derive(Debug, Clone, Serialize)]
pub struct AccountEvaluation {
    pub account_id: i64,
    /// Sum of all scores received
    pub score: i64,
    /// Number of ratings received
    pub assign_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl AccountEvaluation {
    /// Mean score, 0.0 before the first rating
    pub fn average(&self) -> f64 {
        if self.assign_count == 0 {
            0.0
        } else {
            self.score as f64 / self.assign_count as f64
        }
    }
}

pub fn is_valid_score(score: i64) -> bool {
    (MIN_SCORE..=MAX_SCORE).contains(&score)
}
