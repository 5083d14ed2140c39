use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// A winery: the tenant every domain request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winery {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Role a user holds within a winery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Consultant,
    WineryOwner,
    Winemaker,
    CellarStaff,
    Lab,
}

impl Role {
    /// Consultants and owners administer the winery.
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Consultant | Self::WineryOwner)
    }
}

/// A user's membership in one winery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WineryMembership {
    pub id: Uuid,
    pub winery: Winery,
    pub role: Role,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}
