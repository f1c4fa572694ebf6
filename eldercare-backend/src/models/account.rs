use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::proximity::{GeoPoint, Located};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccountRole {
    /// Elderly person or family member asking for help
    #[default]
    User,
    Volunteer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[default]
    Man,
    Woman,
}

impl Sex {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Man => 0,
            Self::Woman => 1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Woman,
            _ => Self::Man,
        }
    }
}

/// Account row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub nickname: String,
    pub avatar: String,
    pub sex: Sex,
    pub phone: String,
    pub age: i32,
    pub role: AccountRole,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: String,
    pub last_location_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Public view of the account (no phone number)
    pub fn to_profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id,
            nickname: self.nickname.clone(),
            avatar: self.avatar.clone(),
            sex: self.sex,
            age: self.age,
            role: self.role,
            latitude: self.latitude,
            longitude: self.longitude,
            address: self.address.clone(),
        }
    }
}

impl Located for Account {
    fn position(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.latitude?, self.longitude?))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountProfile {
    pub id: i64,
    pub nickname: String,
    pub avatar: String,
    pub sex: Sex,
    pub age: i32,
    pub role: AccountRole,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: String,
}

/// Registration request
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub nickname: String,
    pub phone: String,
    #[serde(default)]
    pub sex: Sex,
    #[serde(default)]
    pub age: i32,
    #[serde(default)]
    pub role: AccountRole,
    #[serde(default)]
    pub avatar: String,
}

/// Partial profile update, absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountUpdate {
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub sex: Option<Sex>,
    pub age: Option<i32>,
    pub role: Option<AccountRole>,
}
