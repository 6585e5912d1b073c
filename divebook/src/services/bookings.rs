use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{deserialize_id, Entity};
use crate::api::{ApiClient, Auth, ClientError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingKind {
    #[default]
    Course,
    Trip,
    Package,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(
        default,
        alias = "_id",
        deserialize_with = "deserialize_id",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,
    #[serde(alias = "type")]
    pub item_type: BookingKind,
    #[serde(deserialize_with = "deserialize_id")]
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default = "default_participants")]
    pub participants: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_participants() -> u32 {
    1
}

impl Entity for Booking {
    const COLLECTION: &'static str = "/bookings/";
    const SLUG: &'static str = "bookings";
    const LABEL: &'static str = "Booking";

    fn id(&self) -> &str {
        &self.id
    }
}

pub struct Bookings {
    client: ApiClient,
}

impl Bookings {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, booking: &Booking, auth: Auth<'_>) -> Result<Booking, ClientError> {
        self.client.post(Booking::COLLECTION, booking, auth).await
    }

    /// Bookings belonging to the signed-in user.
    pub async fn mine(&self, auth: Auth<'_>) -> Result<Vec<Booking>, ClientError> {
        self.client.get("/bookings/my-bookings", auth).await
    }
}
