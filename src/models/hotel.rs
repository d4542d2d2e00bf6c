use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId, // owner
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub total_bookings: i64,
    #[serde(default)]
    pub total_revenue: f64,
}

impl Hotel {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.to_hex() == user_id
    }
}
