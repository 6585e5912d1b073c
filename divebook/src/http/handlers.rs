use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::wrappers::BroadcastStream;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::GlobalKeyExtractor,
    GovernorLayer,
};
use tracing::{debug, warn};

use crate::api::Auth;
use crate::navigation::track_navigation;
use crate::services::coupons::{CouponCheck, CouponValidation};
use crate::services::courses::Course;
use crate::services::packages::Package;
use crate::services::trips::Trip;

use super::error::ApiError;
use super::responses::{mutation, HealthResponse, Mutation, NavigationStatus, Toast};
use super::session::{discard_unreadable_session, SessionContext};
use super::state::AppState;
use super::{account, admin, auth, pages};

pub fn router(state: AppState) -> Router {
    let page_routes = Router::new()
        .route("/", get(pages::home))
        .route("/courses", get(pages::catalog::<Course>))
        .route("/courses/{id}", get(pages::detail::<Course>))
        .route("/trips", get(pages::catalog::<Trip>))
        .route("/trips/{id}", get(pages::detail::<Trip>))
        .route("/packages", get(pages::catalog::<Package>))
        .route("/packages/{id}", get(pages::detail::<Package>))
        .route("/gallery", get(pages::gallery))
        .route("/blog", get(pages::blog))
        .route("/blog/{id}", get(pages::blog_post))
        .route("/login", get(pages::login_page))
        .route("/admin/login", get(pages::admin_login_page))
        .route("/account", get(account::overview))
        .route("/account/bookings", get(account::bookings_page))
        .route("/account/payments/{invoice_id}", get(account::payment_page))
        .route("/admin", get(admin::dashboard))
        .route("/admin/users", get(admin::users_page))
        .route_layer(middleware::from_fn_with_state(
            state.navigation.clone(),
            track_navigation,
        ));

    let api = Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/admin/login", post(auth::admin_login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/session", get(auth::current_session))
        .route("/api/account/profile", put(account::update_profile))
        .route("/api/account/bookings", post(account::create_booking))
        .route("/api/account/payments/invoice", post(account::create_invoice))
        .route(
            "/api/account/payments/invoice/{id}/status",
            get(account::invoice_status),
        )
        .route(
            "/api/account/notifications/{id}/read",
            put(account::mark_notification_read),
        )
        .route("/api/currency", get(convert_currency))
        .route("/api/coupons/validate", post(validate_coupon))
        .route("/api/navigation", get(navigation_status))
        .route("/api/navigation/events", get(navigation_events))
        .merge(admin::api_routes(state.max_upload_bytes));

    let app = page_routes.merge(api).layer(middleware::from_fn_with_state(
        state.clone(),
        discard_unreadable_session,
    ));

    // One token every 50ms with a burst of 50, shared by all clients.
    let governor_conf = GovernorConfigBuilder::default()
        .per_millisecond(50)
        .burst_size(50)
        .key_extractor(GlobalKeyExtractor)
        .finish();
    let app = match governor_conf {
        Some(conf) => app.layer(GovernorLayer::new(Arc::new(conf))),
        None => {
            warn!("invalid rate limit settings; serving without rate limiting");
            app
        }
    };

    app.layer(
        tower_http::request_id::SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            tower_http::request_id::MakeRequestUuid::default(),
        ),
    )
    .layer(tower_http::request_id::PropagateRequestIdLayer::new(
        axum::http::header::HeaderName::from_static("x-request-id"),
    ))
    .layer(tower_http::trace::TraceLayer::new_for_http())
    .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        api_url: state.services.client().base_url().to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct CurrencyQuery {
    amount: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

/// Validated conversion request: a non-negative amount and two ISO-4217 codes.
fn currency_params(query: CurrencyQuery) -> Result<(String, String, String), ApiError> {
    let required = |value: Option<String>| {
        value
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };
    let (Some(amount), Some(from), Some(to)) = (
        required(query.amount),
        required(query.from),
        required(query.to),
    ) else {
        return Err(ApiError::bad_request("amount, from and to are required"));
    };

    if !amount
        .parse::<f64>()
        .is_ok_and(|value| value.is_finite() && value >= 0.0)
    {
        return Err(ApiError::bad_request("amount must be a non-negative number"));
    }

    let code = |raw: String| {
        if raw.len() == 3 && raw.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(raw.to_ascii_uppercase())
        } else {
            Err(ApiError::bad_request(format!("invalid currency code: {raw}")))
        }
    };
    Ok((amount, code(from)?, code(to)?))
}

/// Proxies the exchange-rate API and returns its JSON unchanged.
async fn convert_currency(
    State(state): State<AppState>,
    Query(query): Query<CurrencyQuery>,
) -> Result<Json<Value>, ApiError> {
    let (amount, from, to) = currency_params(query)?;
    let converted = state
        .currency
        .convert(&amount, &from, &to)
        .await
        .map_err(|err| {
            warn!(error = %err, from = %from, to = %to, "currency conversion failed");
            ApiError::Failed("failed to convert currency")
        })?;
    Ok(Json(converted))
}

/// Checks a coupon against an amount. Signed-in visitors send their token so
/// per-user coupon rules apply.
async fn validate_coupon(
    State(state): State<AppState>,
    session: SessionContext,
    Json(check): Json<CouponCheck>,
) -> Result<Json<Mutation<CouponValidation>>, ApiError> {
    if check.code.trim().is_empty() {
        return Err(ApiError::bad_request("coupon code is required"));
    }
    if !check.amount.is_finite() || check.amount < 0.0 {
        return Err(ApiError::bad_request("amount must be a non-negative number"));
    }

    let auth = if session.state().token().is_some() {
        Auth::Session(session.state())
    } else {
        Auth::Anonymous
    };
    let validation = state.services.coupons().validate(&check, auth).await?;
    debug!(code = %check.code, valid = validation.is_valid(), "coupon checked");

    let toast = if validation.is_valid() {
        Toast::success(
            validation
                .message
                .clone()
                .unwrap_or_else(|| String::from("Coupon applied")),
        )
    } else {
        Toast::error(
            validation
                .message
                .clone()
                .unwrap_or_else(|| String::from("This coupon is not valid")),
        )
    };
    Ok(mutation(validation, toast))
}

async fn navigation_status(State(state): State<AppState>) -> Json<NavigationStatus> {
    Json(NavigationStatus {
        loading: state.navigation.is_loading(),
        timeout_ms: u64::try_from(state.navigation.timeout().as_millis()).unwrap_or(u64::MAX),
    })
}

/// Server-sent stream of navigation start/finish/timeout events.
async fn navigation_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = BroadcastStream::new(state.navigation.subscribe()).filter_map(|event| async move {
        let event = event.ok()?;
        Event::default()
            .event("navigation")
            .json_data(&event)
            .ok()
            .map(Ok)
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::{currency_params, CurrencyQuery};

    fn query(amount: &str, from: &str, to: &str) -> CurrencyQuery {
        CurrencyQuery {
            amount: Some(amount.into()),
            from: Some(from.into()),
            to: Some(to.into()),
        }
    }

    #[test]
    fn currency_codes_are_normalized() {
        let (amount, from, to) = currency_params(query("12.5", "usd", " eur ")).unwrap();
        assert_eq!((amount.as_str(), from.as_str(), to.as_str()), ("12.5", "USD", "EUR"));
    }

    #[test]
    fn bad_currency_input_is_rejected() {
        assert!(currency_params(CurrencyQuery::default()).is_err());
        assert!(currency_params(query("ten", "USD", "EUR")).is_err());
        assert!(currency_params(query("-3", "USD", "EUR")).is_err());
        assert!(currency_params(query("10", "DOLLARS", "EUR")).is_err());
    }
}
