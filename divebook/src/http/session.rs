use std::convert::Infallible;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use super::error::ApiError;
use super::state::AppState;
use crate::session::{CookieStorage, SessionStorage, SessionStore, UserType, AUTH_COOKIE};

/// The visitor's session, rehydrated from the `auth-storage` cookie.
pub type SessionContext = SessionStore<CookieStorage>;

const NEXT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

impl FromRequestParts<AppState> for SessionStore<CookieStorage> {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(load_session(parts, state))
    }
}

fn load_session(parts: &Parts, state: &AppState) -> SessionContext {
    let jar = CookieJar::from_headers(&parts.headers);
    SessionStore::load(CookieStorage::new(jar, state.cookies.clone()))
}

/// Cookie changes made through the session, ready to return from a handler.
pub fn session_cookies(session: SessionContext) -> CookieJar {
    session.into_storage().into_jar()
}

/// Expires an unreadable `auth-storage` cookie on the way out, unless the
/// handler already wrote a new session.
pub async fn discard_unreadable_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let mut storage = CookieStorage::new(jar, state.cookies.clone());
    let unreadable = storage.load().is_err();

    let response = next.run(request).await;
    if !unreadable || writes_session_cookie(&response) {
        return response;
    }
    storage.clear();
    (storage.into_jar(), response).into_response()
}

fn writes_session_cookie(response: &Response) -> bool {
    let prefix = format!("{AUTH_COOKIE}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .any(|value| value.to_str().is_ok_and(|value| value.starts_with(&prefix)))
}

/// Only accept same-site relative targets for post-login redirects.
/// Backslashes are rejected because browsers read `/\host` as `//host`.
pub fn safe_next(next: Option<&str>, fallback: &'static str) -> String {
    match next.map(str::trim) {
        Some(target)
            if target.starts_with('/')
                && !target.starts_with("//")
                && !target.contains('\\')
                && !target.chars().any(char::is_control) =>
        {
            target.to_string()
        }
        _ => fallback.to_string(),
    }
}

/// Sent when a guarded route is hit without the required identity. Pages
/// redirect to the matching login page; `/api/` routes answer with JSON.
#[derive(Debug)]
pub struct AuthRejection {
    required: UserType,
    target: String,
    api: bool,
    signed_in: bool,
}

impl AuthRejection {
    fn new(parts: &Parts, required: UserType, signed_in: bool) -> Self {
        let target = parts
            .uri
            .path_and_query()
            .map(|value| value.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        Self {
            required,
            api: parts.uri.path().starts_with("/api/"),
            target,
            signed_in,
        }
    }

    pub fn login_location(&self) -> String {
        let login = match self.required {
            UserType::User => "/login",
            UserType::Admin => "/admin/login",
        };
        format!(
            "{login}?next={}",
            utf8_percent_encode(&self.target, NEXT_ENCODE_SET)
        )
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        debug!(
            target_path = %self.target,
            required = ?self.required,
            signed_in = self.signed_in,
            "guarded route rejected"
        );
        if self.api {
            let error = if self.signed_in {
                ApiError::Forbidden
            } else {
                ApiError::Unauthorized
            };
            return error.into_response();
        }
        Redirect::to(&self.login_location()).into_response()
    }
}

/// Extracts the session only when a customer is signed in.
pub struct RequireUser(pub SessionContext);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = load_session(parts, state);
        if session.is_user() {
            Ok(Self(session))
        } else {
            Err(AuthRejection::new(
                parts,
                UserType::User,
                session.state().is_authenticated(),
            ))
        }
    }
}

/// Extracts the session only when an admin is signed in.
pub struct RequireAdmin(pub SessionContext);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = load_session(parts, state);
        if session.is_admin() {
            Ok(Self(session))
        } else {
            Err(AuthRejection::new(
                parts,
                UserType::Admin,
                session.state().is_authenticated(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::safe_next;

    #[test]
    fn next_targets_must_stay_on_site() {
        assert_eq!(safe_next(Some("/account/bookings"), "/account"), "/account/bookings");
        assert_eq!(safe_next(Some("//evil.example"), "/account"), "/account");
        assert_eq!(safe_next(Some("https://evil.example"), "/admin"), "/admin");
        assert_eq!(safe_next(None, "/account"), "/account");
        assert_eq!(safe_next(Some("/\\evil.example"), "/account"), "/account");
        assert_eq!(safe_next(Some("/admin\\..\\evil"), "/admin"), "/admin");
        assert_eq!(safe_next(Some("/\t/evil.example"), "/account"), "/account");
        assert_eq!(safe_next(Some("/blog?page=2"), "/account"), "/blog?page=2");
    }
}
