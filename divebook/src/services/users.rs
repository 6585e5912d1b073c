use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::{ApiClient, Auth, ClientError};
use crate::session::Identity;

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Login/registration answer. Admin endpoints name the identity `admin`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(alias = "admin")]
    pub user: Identity,
    #[serde(default)]
    pub token: Option<String>,
}

pub struct Users {
    client: ApiClient,
}

impl Users {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ClientError> {
        self.client
            .post("/users/login", credentials, Auth::Anonymous)
            .await
    }

    pub async fn register(&self, registration: &Registration) -> Result<AuthResponse, ClientError> {
        self.client
            .post("/users/register", registration, Auth::Anonymous)
            .await
    }

    pub async fn profile(&self, auth: Auth<'_>) -> Result<Identity, ClientError> {
        self.client.get("/users/profile", auth).await
    }

    pub async fn update_profile(
        &self,
        changes: &Map<String, Value>,
        auth: Auth<'_>,
    ) -> Result<Identity, ClientError> {
        self.client.put("/users/profile", changes, auth).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::{AuthResponse, Credentials};

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials {
            email: "mara@example.com".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("mara@example.com"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn auth_response_accepts_admin_key() {
        let parsed: AuthResponse =
            serde_json::from_value(json!({"admin": {"_id": "a1", "name": "Root"}, "token": "t"}))
                .unwrap();
        assert_eq!(parsed.user.id, "a1");
        assert_eq!(parsed.token.as_deref(), Some("t"));
    }
}
