use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::service::ServiceType;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Booked,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booked => "booked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "booked" => Some(Self::Booked),
            _ => None,
        }
    }
}

/// Feed for the recommendation side of the marketplace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub student_id: UserId,
    pub consultant_id: UserId,
    pub interaction_type: InteractionType,
    pub service_type: ServiceType,
    pub occurred_at: DateTime<Utc>,
}
