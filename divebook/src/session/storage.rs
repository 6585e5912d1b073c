use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use percent_encoding::percent_decode_str;
#[cfg(test)]
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Session;

/// Name of the cookie holding the persisted session.
pub const AUTH_COOKIE: &str = "auth-storage";

/// Same characters `encodeURIComponent` leaves alone.
#[cfg(test)]
const COOKIE_VALUE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session payload is not valid utf-8")]
    Encoding,
    #[error("invalid session payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Where a [`super::SessionStore`] keeps its persisted state.
pub trait SessionStorage {
    fn load(&self) -> Result<Option<Session>, StorageError>;
    fn save(&mut self, session: &Session) -> Result<(), StorageError>;
    fn clear(&mut self);
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    state: Session,
    #[serde(default)]
    version: u32,
}

/// Serialize to the `auth-storage` wire format: percent-encoded
/// `{"state":{...},"version":0}`.
#[cfg(test)]
pub fn encode_session(session: &Session) -> Result<String, StorageError> {
    let json = session_json(session)?;
    Ok(utf8_percent_encode(&json, COOKIE_VALUE_ENCODE_SET).to_string())
}

pub fn decode_session(raw: &str) -> Result<Session, StorageError> {
    let json = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| StorageError::Encoding)?;
    session_from_json(&json)
}

fn session_json(session: &Session) -> Result<String, StorageError> {
    let envelope = PersistedSession {
        state: session.clone(),
        version: 0,
    };
    Ok(serde_json::to_string(&envelope)?)
}

fn session_from_json(json: &str) -> Result<Session, StorageError> {
    let envelope: PersistedSession = serde_json::from_str(json)?;
    Ok(envelope.state)
}

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub ttl: Duration,
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(7 * 24 * 3600),
            secure: false,
        }
    }
}

/// Session persistence in the `auth-storage` cookie. Changes accumulate in the
/// jar; return [`CookieStorage::into_jar`] from the handler to emit them.
#[derive(Debug, Clone)]
pub struct CookieStorage {
    jar: CookieJar,
    settings: CookieSettings,
}

impl CookieStorage {
    pub fn new(jar: CookieJar, settings: CookieSettings) -> Self {
        Self { jar, settings }
    }

    pub fn into_jar(self) -> CookieJar {
        self.jar
    }

    fn max_age(&self) -> cookie::time::Duration {
        let seconds = i64::try_from(self.settings.ttl.as_secs()).unwrap_or(i64::MAX);
        cookie::time::Duration::seconds(seconds)
    }
}

impl SessionStorage for CookieStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        match self.jar.get(AUTH_COOKIE) {
            // The jar has already undone one layer of percent-encoding.
            Some(cookie) if !cookie.value().is_empty() => session_from_json(cookie.value())
                .or_else(|_| decode_session(cookie.value()))
                .map(Some),
            _ => Ok(None),
        }
    }

    fn save(&mut self, session: &Session) -> Result<(), StorageError> {
        // Percent-encoded by the jar when the response is written.
        let value = session_json(session)?;
        let cookie = Cookie::build((AUTH_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.settings.secure)
            .max_age(self.max_age())
            .build();
        self.jar = self.jar.clone().add(cookie);
        Ok(())
    }

    fn clear(&mut self) {
        self.jar = self.jar.clone().remove(Cookie::build(AUTH_COOKIE).path("/"));
    }
}

/// In-process storage holding the encoded cookie value.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    raw: Option<String>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
        }
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

#[cfg(test)]
impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        self.raw.as_deref().map(decode_session).transpose()
    }

    fn save(&mut self, session: &Session) -> Result<(), StorageError> {
        self.raw = Some(encode_session(session)?);
        Ok(())
    }

    fn clear(&mut self) {
        self.raw = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use axum_extra::extract::cookie::{Cookie, CookieJar};
    use serde_json::Value;

    use super::{
        decode_session, encode_session, CookieSettings, CookieStorage, SessionStorage, AUTH_COOKIE,
    };
    use crate::session::{Identity, SessionStore};

    #[test]
    fn encoded_cookie_matches_wire_layout() {
        let mut store = SessionStore::load(super::MemoryStorage::default());
        store
            .login(
                Identity {
                    id: "u1".into(),
                    name: Some("Mara".into()),
                    ..Identity::default()
                },
                "tok".into(),
            )
            .unwrap();

        let encoded = encode_session(store.state()).unwrap();
        assert!(!encoded.contains('"'));
        assert!(!encoded.contains(';'));

        let json: Value = serde_json::from_str(
            &percent_encoding::percent_decode_str(&encoded)
                .decode_utf8()
                .unwrap(),
        )
        .unwrap();
        let state = &json["state"];
        assert_eq!(state["isAuthenticated"], Value::Bool(true));
        assert_eq!(state["userType"], Value::from("user"));
        assert_eq!(state["token"], Value::from("tok"));
        assert_eq!(state["admin"], Value::Null);
        assert_eq!(json["version"], Value::from(0));

        assert_eq!(decode_session(&encoded).unwrap(), store.state().clone());
    }

    #[test]
    fn cookie_storage_sets_attributes_and_removes_on_clear() {
        let settings = CookieSettings {
            ttl: Duration::from_secs(3600),
            secure: true,
        };
        let existing = CookieJar::new().add(Cookie::new(AUTH_COOKIE, "stale"));
        let mut storage = CookieStorage::new(existing, settings);

        storage
            .save(&crate::session::Session::default())
            .unwrap();
        let jar = storage.clone().into_jar();
        let cookie = jar.get(AUTH_COOKIE).unwrap();
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::hours(1)));

        storage.clear();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn cookie_storage_reads_plain_and_encoded_values() {
        let mut store = SessionStore::load(super::MemoryStorage::default());
        store
            .admin_login(
                Identity {
                    id: "a1".into(),
                    ..Identity::default()
                },
                "admin-tok".into(),
            )
            .unwrap();
        let encoded = encode_session(store.state()).unwrap();
        let plain = percent_encoding::percent_decode_str(&encoded)
            .decode_utf8()
            .unwrap()
            .into_owned();

        for value in [plain, encoded] {
            let jar = CookieJar::new().add(Cookie::new(AUTH_COOKIE, value));
            let storage = CookieStorage::new(jar, CookieSettings::default());
            assert_eq!(storage.load().unwrap().as_ref(), Some(store.state()));
        }
    }
}
