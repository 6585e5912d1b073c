use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{deserialize_id, Entity};

/// A scheduled dive trip to a destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    #[serde(
        default,
        alias = "_id",
        deserialize_with = "deserialize_id",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_spots: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trip {
    pub fn is_sold_out(&self) -> bool {
        self.available_spots == Some(0)
    }

    /// Whether `participants` more divers fit. Trips without a spot count
    /// are unlimited.
    pub fn has_room(&self, participants: u32) -> bool {
        self.available_spots.map_or(true, |spots| participants <= spots)
    }
}

impl Entity for Trip {
    const COLLECTION: &'static str = "/trips/";
    const SLUG: &'static str = "trips";
    const LABEL: &'static str = "Trip";

    fn id(&self) -> &str {
        &self.id
    }
}
