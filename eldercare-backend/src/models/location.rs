use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proximity::{GeoPoint, Located};

/// One reported position of an account
#[derive(Debug, Clone, Serialize)]
pub struct UserLocation {
    pub id: i64,
    pub account_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub accuracy: f64,
    pub speed: f64,
    pub heading: f64,
    pub created_at: DateTime<Utc>,
}

impl Located for UserLocation {
    fn position(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.latitude, self.longitude))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
}
