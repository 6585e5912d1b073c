use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{deserialize_id, encode_segment, Entity};
use crate::api::{ApiClient, Auth, ClientError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(
        default,
        alias = "_id",
        deserialize_with = "deserialize_id",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "isRead")]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Notification {
    const COLLECTION: &'static str = "/notifications/";
    const SLUG: &'static str = "notifications";
    const LABEL: &'static str = "Notification";

    fn id(&self) -> &str {
        &self.id
    }
}

pub struct Notifications {
    client: ApiClient,
}

impl Notifications {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Notifications addressed to the signed-in user.
    pub async fn mine(&self, auth: Auth<'_>) -> Result<Vec<Notification>, ClientError> {
        self.client.get("/notifications/my", auth).await
    }

    pub async fn mark_read(&self, id: &str, auth: Auth<'_>) -> Result<Value, ClientError> {
        let path = format!("/notifications/{}/read", encode_segment(id));
        self.client.put(&path, &json!({}), auth).await
    }
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|item| !item.read).count()
}
