use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant record as stored by the rent-management backend. The lifecycle
/// only reads it to resolve the current obligation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Tenant {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub property_id: Uuid,
    pub room_id: Option<Uuid>,
    /// Monthly rent figure. Zero means no obligation is projected.
    pub rent_amount: f64,
    pub is_active: bool,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn has_rent_configured(&self) -> bool {
        self.is_active && self.rent_amount > 0.0
    }
}

#[cfg(test)]
impl Tenant {
    /// Active tenant fixture with a 10,000 monthly rent.
    pub fn sample() -> Self {
        Tenant {
            id: Uuid::new_v4(),
            name: "Asha Verma".to_string(),
            property_id: Uuid::new_v4(),
            room_id: Some(Uuid::new_v4()),
            rent_amount: 10_000.0,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
