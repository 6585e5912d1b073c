use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{deserialize_id, Entity};

/// A certification or training course (Open Water, Advanced, Rescue...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(
        default,
        alias = "_id",
        deserialize_with = "deserialize_id",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Course {
    const COLLECTION: &'static str = "/courses/";
    const SLUG: &'static str = "courses";
    const LABEL: &'static str = "Course";

    fn id(&self) -> &str {
        &self.id
    }
}
