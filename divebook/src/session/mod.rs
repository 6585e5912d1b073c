//! Authentication state for one visitor: who is signed in (customer or admin)
//! and the bearer token the booking API issued.
//!
//! A [`SessionStore`] is built per request from a [`SessionStorage`] strategy
//! (the `auth-storage` cookie in production, memory in tests). Every mutation
//! replaces the relevant fields at once and writes the persisted subset back
//! through the storage, so the cookie always mirrors the in-memory state.
//!
//! Invariants:
//! - `is_authenticated` is true iff `token` is present.
//! - at most one of `user`/`admin` is set, matching `user_type`.

mod storage;

pub use storage::{CookieSettings, CookieStorage, SessionStorage, StorageError, AUTH_COOKIE};
#[cfg(test)]
pub use storage::{decode_session, MemoryStorage};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::services::deserialize_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    User,
    Admin,
}

/// A signed-in customer or admin, as returned by the booking API.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Identity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Records may carry `_id`, `id`, or both (virtual ids); `id` wins.
impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let id = fields.remove("id").filter(|value| !value.is_null());
        let legacy_id = fields.remove("_id");
        let id = match id.or(legacy_id) {
            Some(value) => deserialize_id(value).map_err(D::Error::custom)?,
            None => String::new(),
        };
        let mut text = |key: &str| match fields.remove(key) {
            Some(Value::String(text)) => Some(text),
            _ => None,
        };
        let name = text("name");
        let email = text("email");
        Ok(Self {
            id,
            name,
            email,
            extra: fields,
        })
    }
}

impl Identity {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(self.id.as_str())
    }
}

/// The persisted session subset. Field names follow the cookie format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    is_authenticated: bool,
    #[serde(default)]
    user: Option<Identity>,
    #[serde(default)]
    admin: Option<Identity>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user_type: Option<UserType>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn user(&self) -> Option<&Identity> {
        self.user.as_ref()
    }

    pub fn admin(&self) -> Option<&Identity> {
        self.admin.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user_type(&self) -> Option<UserType> {
        self.user_type
    }

    fn for_user(user: Identity, token: String) -> Self {
        Self {
            is_authenticated: true,
            user: Some(user),
            admin: None,
            token: Some(token),
            user_type: Some(UserType::User),
        }
    }

    fn for_admin(admin: Identity, token: String) -> Self {
        Self {
            is_authenticated: true,
            user: None,
            admin: Some(admin),
            token: Some(token),
            user_type: Some(UserType::Admin),
        }
    }

    /// Rebuild a session from persisted fields, dropping anything that breaks
    /// the invariants. A partially valid cookie signs the visitor out.
    fn normalized(self) -> Self {
        let token = self.token.filter(|token| !token.trim().is_empty());
        match (token, self.user_type, self.user, self.admin) {
            (Some(token), Some(UserType::User), Some(user), _) => Self::for_user(user, token),
            (Some(token), Some(UserType::Admin), _, Some(admin)) => Self::for_admin(admin, token),
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("token must not be empty")]
    EmptyToken,
    #[error("no user is signed in")]
    NoUser,
    #[error("invalid user update: {0}")]
    InvalidUpdate(#[source] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Session state bound to the storage it was loaded from.
#[derive(Debug)]
pub struct SessionStore<S> {
    state: Session,
    storage: S,
}

impl<S: SessionStorage> SessionStore<S> {
    /// Rehydrate from storage. Unreadable payloads are discarded and cleared
    /// so a corrupt cookie cannot keep failing on every request.
    pub fn load(mut storage: S) -> Self {
        let state = match storage.load() {
            Ok(Some(session)) => session.normalized(),
            Ok(None) => Session::default(),
            Err(err) => {
                warn!(error = %err, "discarding unreadable session");
                storage.clear();
                Session::default()
            }
        };
        Self { state, storage }
    }

    pub fn state(&self) -> &Session {
        &self.state
    }

    pub fn login(&mut self, user: Identity, token: String) -> Result<(), SessionError> {
        let token = non_empty_token(token)?;
        debug!(user_id = %user.id, "user signed in");
        self.replace(Session::for_user(user, token))
    }

    pub fn admin_login(&mut self, admin: Identity, token: String) -> Result<(), SessionError> {
        let token = non_empty_token(token)?;
        debug!(admin_id = %admin.id, "admin signed in");
        self.replace(Session::for_admin(admin, token))
    }

    pub fn logout(&mut self) {
        self.state = Session::default();
        self.storage.clear();
        debug!("session cleared");
    }

    /// Shallow-merge `partial` into the signed-in user's record.
    pub fn update_user(&mut self, partial: Map<String, Value>) -> Result<(), SessionError> {
        let Some(user) = self.state.user.as_ref() else {
            return Err(SessionError::NoUser);
        };

        let mut merged = serde_json::to_value(user).map_err(SessionError::InvalidUpdate)?;
        if let Value::Object(fields) = &mut merged {
            fields.extend(partial);
        }
        let updated: Identity =
            serde_json::from_value(merged).map_err(SessionError::InvalidUpdate)?;

        let mut next = self.state.clone();
        next.user = Some(updated);
        self.replace(next)
    }

    pub fn is_admin(&self) -> bool {
        self.state.is_authenticated && self.state.user_type == Some(UserType::Admin)
    }

    pub fn is_user(&self) -> bool {
        self.state.is_authenticated && self.state.user_type == Some(UserType::User)
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Persist first so a storage failure leaves the previous state in place.
    fn replace(&mut self, next: Session) -> Result<(), SessionError> {
        self.storage.save(&next)?;
        self.state = next;
        Ok(())
    }
}

fn non_empty_token(token: String) -> Result<String, SessionError> {
    if token.trim().is_empty() {
        Err(SessionError::EmptyToken)
    } else {
        Ok(token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{
        decode_session, Identity, MemoryStorage, SessionError, SessionStore, UserType,
    };

    fn identity(id: &str, name: &str) -> Identity {
        Identity {
            id: id.to_string(),
            name: Some(name.to_string()),
            email: Some(format!("{name}@example.com")),
            extra: Map::new(),
        }
    }

    fn persisted(store: SessionStore<MemoryStorage>) -> Option<super::Session> {
        store
            .into_storage()
            .raw()
            .map(|raw| decode_session(raw).unwrap())
    }

    #[test]
    fn user_login_sets_user_type_and_persists() {
        let mut store = SessionStore::load(MemoryStorage::default());
        store.admin_login(identity("a1", "root"), "admin-token".into()).unwrap();

        store.login(identity("u1", "mara"), "user-token".into()).unwrap();

        let state = store.state();
        assert!(state.is_authenticated());
        assert_eq!(state.user_type(), Some(UserType::User));
        assert_eq!(state.user().map(|u| u.id.as_str()), Some("u1"));
        assert!(state.admin().is_none());
        assert_eq!(state.token(), Some("user-token"));
        assert!(store.is_user());
        assert!(!store.is_admin());

        let saved = persisted(store).unwrap();
        assert_eq!(saved.user_type(), Some(UserType::User));
        assert!(saved.admin().is_none());
    }

    #[test]
    fn admin_login_clears_user_fields() {
        let mut store = SessionStore::load(MemoryStorage::default());
        store.login(identity("u1", "mara"), "user-token".into()).unwrap();

        store.admin_login(identity("a1", "root"), "admin-token".into()).unwrap();

        assert!(store.is_admin());
        assert!(!store.is_user());
        assert!(store.state().user().is_none());
        assert_eq!(store.state().admin().map(|a| a.id.as_str()), Some("a1"));
        assert_eq!(store.state().token(), Some("admin-token"));
    }

    #[test]
    fn logout_clears_identity_and_storage() {
        let mut store = SessionStore::load(MemoryStorage::default());
        store.login(identity("u1", "mara"), "user-token".into()).unwrap();

        store.logout();

        let state = store.state();
        assert!(!state.is_authenticated());
        assert!(state.user().is_none());
        assert!(state.admin().is_none());
        assert!(state.token().is_none());
        assert!(state.user_type().is_none());
        assert!(store.into_storage().raw().is_none());
    }

    #[test]
    fn empty_token_is_rejected_without_touching_state() {
        let mut store = SessionStore::load(MemoryStorage::default());
        let result = store.login(identity("u1", "mara"), "  ".into());

        assert!(matches!(result, Err(SessionError::EmptyToken)));
        assert!(!store.state().is_authenticated());
        assert!(store.into_storage().raw().is_none());
    }

    #[test]
    fn update_user_merges_fields() {
        let mut store = SessionStore::load(MemoryStorage::default());
        store.login(identity("u1", "mara"), "user-token".into()).unwrap();

        let mut patch = Map::new();
        patch.insert("name".into(), json!("Mara K."));
        patch.insert("phone".into(), json!("+34 600 000 000"));
        store.update_user(patch).unwrap();

        let user = store.state().user().unwrap();
        assert_eq!(user.name.as_deref(), Some("Mara K."));
        assert_eq!(user.email.as_deref(), Some("mara@example.com"));
        assert_eq!(user.extra.get("phone"), Some(&json!("+34 600 000 000")));

        let saved = persisted(store).unwrap();
        assert_eq!(saved.user().unwrap().name.as_deref(), Some("Mara K."));
    }

    #[test]
    fn update_user_without_user_fails() {
        let mut store = SessionStore::load(MemoryStorage::default());
        store.admin_login(identity("a1", "root"), "admin-token".into()).unwrap();

        let result = store.update_user(Map::new());

        assert!(matches!(result, Err(SessionError::NoUser)));
        assert!(store.is_admin());
    }

    #[test]
    fn rehydrates_from_storage() {
        let mut first = SessionStore::load(MemoryStorage::default());
        first.login(identity("u1", "mara"), "user-token".into()).unwrap();
        let storage = first.into_storage();

        let second = SessionStore::load(storage);

        assert!(second.is_user());
        assert_eq!(second.state().user().unwrap().display_name(), "mara");
    }

    #[test]
    fn inconsistent_payload_rehydrates_as_signed_out() {
        let raw = json!({
            "state": {
                "isAuthenticated": true,
                "user": null,
                "admin": null,
                "token": "orphan",
                "userType": "user"
            }
        });
        let storage = MemoryStorage::with_raw(raw.to_string());

        let store = SessionStore::load(storage);

        assert!(!store.state().is_authenticated());
        assert!(store.state().token().is_none());
    }

    #[test]
    fn corrupt_payload_is_cleared() {
        let store = SessionStore::load(MemoryStorage::with_raw("%7Bnot-json"));

        assert!(!store.state().is_authenticated());
        assert!(store.into_storage().raw().is_none());
    }

    #[test]
    fn identity_accepts_numeric_mongo_style_ids() {
        let user: Identity =
            serde_json::from_value(json!({"_id": 42, "name": "Ana", "role": "diver"})).unwrap();

        assert_eq!(user.id, "42");
        assert_eq!(user.extra.get("role"), Some(&Value::from("diver")));
    }

    #[test]
    fn identity_prefers_virtual_id_when_both_are_sent() {
        let user: Identity = serde_json::from_value(json!({
            "_id": "64f1c2",
            "id": "64f1c2-virtual",
            "name": "Ana",
            "email": "ana@example.com"
        }))
        .unwrap();

        assert_eq!(user.id, "64f1c2-virtual");
        assert_eq!(user.email.as_deref(), Some("ana@example.com"));
        assert!(user.extra.is_empty());
    }
}
