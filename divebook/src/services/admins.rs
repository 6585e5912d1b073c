use serde_json::Value;

use super::encode_segment;
use super::users::{AuthResponse, Credentials, Registration};
use crate::api::{ApiClient, Auth, ClientError};
use crate::session::Identity;

pub struct Admins {
    client: ApiClient,
}

impl Admins {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ClientError> {
        self.client
            .post("/admins/login", credentials, Auth::Anonymous)
            .await
    }

    /// Every customer account, for the back-office user table.
    pub async fn all_users(&self, auth: Auth<'_>) -> Result<Vec<Identity>, ClientError> {
        self.client.get("/admins/get-all-users", auth).await
    }

    pub async fn list(&self, auth: Auth<'_>) -> Result<Vec<Identity>, ClientError> {
        self.client.get("/admins/", auth).await
    }

    pub async fn register(
        &self,
        registration: &Registration,
        auth: Auth<'_>,
    ) -> Result<Identity, ClientError> {
        let created: Value = self
            .client
            .post("/admins/register", registration, auth)
            .await?;
        // Some deployments answer with `{admin, token}`, others with the record.
        let record = match created {
            Value::Object(mut fields) if fields.contains_key("admin") => {
                fields.remove("admin").unwrap_or(Value::Null)
            }
            other => other,
        };
        serde_json::from_value(record).map_err(|source| ClientError::Decode {
            endpoint: String::from("/admins/register"),
            source,
        })
    }

    pub async fn delete(&self, id: &str, auth: Auth<'_>) -> Result<(), ClientError> {
        let path = format!("/admins/{}", encode_segment(id));
        self.client.delete::<Value>(&path, auth).await.map(|_| ())
    }
}
