//! Signed-in customer area: profile, bookings, notifications and payments.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::error::ApiError;
use super::responses::{mutation, AccountContent, Listing, Mutation, Page, PaymentContent, Toast};
use super::session::{session_cookies, RequireUser};
use super::state::AppState;
use crate::api::Auth;
use crate::services::bookings::{Booking, BookingKind};
use crate::services::notifications::unread_count;
use crate::services::payments::{Invoice, InvoiceRequest, InvoiceState, InvoiceStatus};
use crate::services::trips::Trip;
use crate::session::Identity;

const SETTLEMENT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const SETTLEMENT_WAIT: Duration = Duration::from_secs(25);

/// Fields a customer may not change through the profile form.
const PROTECTED_PROFILE_FIELDS: [&str; 5] = ["id", "_id", "role", "token", "password"];

pub async fn overview(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
) -> Result<Json<Page<AccountContent>>, ApiError> {
    let auth = Auth::Session(session.state());
    let services = &state.services;
    let (users, bookings, notifications) = (
        services.users(),
        services.bookings(),
        services.notifications(),
    );

    let (profile, bookings, notifications) = tokio::try_join!(
        users.profile(auth),
        bookings.mine(auth),
        notifications.mine(auth),
    )?;
    let unread_notifications = unread_count(&notifications);

    Ok(Page::new(
        "account",
        session.state(),
        AccountContent {
            profile,
            bookings,
            notifications,
            unread_notifications,
        },
    ))
}

pub async fn bookings_page(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
) -> Result<Json<Page<Listing<Booking>>>, ApiError> {
    let bookings = state
        .services
        .bookings()
        .mine(Auth::Session(session.state()))
        .await?;
    Ok(Page::new("bookings", session.state(), Listing::new(bookings)))
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentPageQuery {
    pub url: Option<String>,
}

/// Hosted payment page; `url` is embedded in an iframe only when it is an
/// absolute http(s) URL.
pub async fn payment_page(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
    Path(invoice_id): Path<String>,
    Query(query): Query<PaymentPageQuery>,
) -> Result<Json<Page<PaymentContent>>, ApiError> {
    let payment_url = query.url.as_deref().and_then(embeddable_url);
    let invoice = state
        .services
        .payments()
        .invoice_status(&invoice_id, Auth::Session(session.state()))
        .await?;

    Ok(Page::new(
        "payment",
        session.state(),
        PaymentContent {
            invoice_id,
            payment_url,
            settled: invoice.status == InvoiceStatus::Paid,
            status: invoice.status,
        },
    ))
}

fn embeddable_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

pub async fn update_profile(
    State(state): State<AppState>,
    RequireUser(mut session): RequireUser,
    Json(mut changes): Json<Map<String, Value>>,
) -> Result<(CookieJar, Json<Mutation<Identity>>), ApiError> {
    for field in PROTECTED_PROFILE_FIELDS {
        changes.remove(field);
    }
    if changes.is_empty() {
        return Err(ApiError::bad_request("nothing to update"));
    }

    let updated = state
        .services
        .users()
        .update_profile(&changes, Auth::Session(session.state()))
        .await?;

    // Prefer the backend's record; fall back to what was sent.
    let merged = match serde_json::to_value(&updated) {
        Ok(Value::Object(fields)) => fields,
        _ => changes,
    };
    session.update_user(merged)?;
    info!(user_id = %updated.id, "profile updated");

    Ok((
        session_cookies(session),
        mutation(updated, Toast::success("Profile updated")),
    ))
}

pub async fn create_booking(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
    Json(booking): Json<Booking>,
) -> Result<Json<Mutation<Booking>>, ApiError> {
    if booking.item_id.trim().is_empty() {
        return Err(ApiError::bad_request("choose what to book"));
    }
    if booking.participants == 0 {
        return Err(ApiError::bad_request("at least one participant is required"));
    }

    if booking.item_type == BookingKind::Trip {
        let trip = state
            .services
            .resource::<Trip>()
            .get(&booking.item_id)
            .await?;
        if trip.is_sold_out() {
            return Err(ApiError::Conflict(format!("{} is sold out", trip.title)));
        }
        if !trip.has_room(booking.participants) {
            let spots = trip.available_spots.unwrap_or_default();
            return Err(ApiError::Conflict(format!(
                "only {spots} spots left on {}",
                trip.title
            )));
        }
    }

    let created = state
        .services
        .bookings()
        .create(&booking, Auth::Session(session.state()))
        .await?;
    info!(
        booking_id = %created.id,
        item_type = ?created.item_type,
        participants = created.participants,
        "booking created"
    );
    Ok(mutation(created, Toast::success("Booking confirmed")))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
    Json(request): Json<InvoiceRequest>,
) -> Result<Json<Mutation<Invoice>>, ApiError> {
    if request.booking_id.trim().is_empty() {
        return Err(ApiError::bad_request("booking_id is required"));
    }
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(ApiError::bad_request("amount must be greater than zero"));
    }

    let invoice = state
        .services
        .payments()
        .create_invoice(&request, Auth::Session(session.state()))
        .await?;
    info!(invoice_id = %invoice.id, booking_id = %request.booking_id, "invoice created");
    Ok(mutation(
        invoice,
        Toast::info("Complete your payment on the secure page"),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceStatusQuery {
    #[serde(default)]
    pub wait: bool,
}

/// Current invoice state. With `wait=true` the request is held until the
/// invoice settles or the wait window closes.
pub async fn invoice_status(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
    Path(invoice_id): Path<String>,
    Query(query): Query<InvoiceStatusQuery>,
) -> Result<Json<InvoiceState>, ApiError> {
    let payments = state.services.payments();
    let auth = Auth::Session(session.state());
    let invoice = if query.wait {
        payments
            .wait_for_settlement(&invoice_id, auth, SETTLEMENT_POLL_INTERVAL, SETTLEMENT_WAIT)
            .await?
    } else {
        payments.invoice_status(&invoice_id, auth).await?
    };
    debug!(invoice_id = %invoice_id, status = %invoice.status, "invoice status checked");
    Ok(Json(invoice))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    RequireUser(session): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<Mutation<Value>>, ApiError> {
    let updated = state
        .services
        .notifications()
        .mark_read(&id, Auth::Session(session.state()))
        .await?;
    Ok(mutation(updated, Toast::success("Notification marked as read")))
}

#[cfg(test)]
mod tests {
    use super::embeddable_url;

    #[test]
    fn only_web_urls_are_embedded() {
        assert_eq!(
            embeddable_url("https://pay.example/invoice/7").as_deref(),
            Some("https://pay.example/invoice/7")
        );
        assert_eq!(embeddable_url("javascript:alert(1)"), None);
        assert_eq!(embeddable_url("/relative/path"), None);
    }
}
