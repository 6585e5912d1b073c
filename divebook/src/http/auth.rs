use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use super::error::ApiError;
use super::responses::{mutation, Mutation, SessionView, Toast};
use super::session::{session_cookies, SessionContext};
use super::state::AppState;
use crate::services::users::{AuthResponse, Credentials, Registration};

type SessionChange = (CookieJar, Json<Mutation<SessionView>>);

fn check_credentials(credentials: &Credentials) -> Result<(), ApiError> {
    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }
    Ok(())
}

fn issued_token(response: &mut AuthResponse) -> Result<String, ApiError> {
    response.token.take().ok_or_else(|| {
        warn!(user_id = %response.user.id, "login response carried no token");
        ApiError::BadGateway
    })
}

fn respond(session: SessionContext, toast: Toast) -> SessionChange {
    let view = SessionView::from(session.state());
    (session_cookies(session), mutation(view, toast))
}

pub async fn login(
    State(state): State<AppState>,
    mut session: SessionContext,
    Json(credentials): Json<Credentials>,
) -> Result<SessionChange, ApiError> {
    check_credentials(&credentials)?;
    let mut response = state.services.users().login(&credentials).await?;
    let token = issued_token(&mut response)?;
    let greeting = format!("Welcome back, {}!", response.user.display_name());

    session.login(response.user, token)?;
    info!(email = %credentials.email, "user logged in");
    Ok(respond(session, Toast::success(greeting)))
}

/// Creates the account and signs the visitor in when the backend issues a
/// token right away.
pub async fn register(
    State(state): State<AppState>,
    mut session: SessionContext,
    Json(registration): Json<Registration>,
) -> Result<SessionChange, ApiError> {
    if registration.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    check_credentials(&Credentials {
        email: registration.email.clone(),
        password: registration.password.clone(),
    })?;

    let response = state.services.users().register(&registration).await?;
    info!(email = %registration.email, "user registered");

    let toast = match response.token {
        Some(token) => {
            session.login(response.user, token)?;
            Toast::success("Account created, you are now signed in")
        }
        None => Toast::info("Account created, please sign in"),
    };
    Ok(respond(session, toast))
}

pub async fn admin_login(
    State(state): State<AppState>,
    mut session: SessionContext,
    Json(credentials): Json<Credentials>,
) -> Result<SessionChange, ApiError> {
    check_credentials(&credentials)?;
    let mut response = state.services.admins().login(&credentials).await?;
    let token = issued_token(&mut response)?;

    session.admin_login(response.user, token)?;
    info!(email = %credentials.email, "admin logged in");
    Ok(respond(session, Toast::success("Signed in to the admin panel")))
}

pub async fn logout(mut session: SessionContext) -> SessionChange {
    session.logout();
    respond(session, Toast::success("You have been signed out"))
}

pub async fn current_session(session: SessionContext) -> Json<SessionView> {
    Json(SessionView::from(session.state()))
}
