use axum::Json;
use serde::{Deserialize, Serialize};

use crate::services::blog::BlogPost;
use crate::services::bookings::Booking;
use crate::services::notifications::Notification;
use crate::services::payments::InvoiceStatus;
use crate::session::{Identity, Session, UserType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Success,
    Error,
    Info,
}

/// Transient notification the view shows after an action.
#[derive(Debug, Clone, Serialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Info,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Mutation<T> {
    pub data: T,
    pub toast: Toast,
}

pub fn mutation<T>(data: T, toast: Toast) -> Json<Mutation<T>> {
    Json(Mutation { data, toast })
}

/// Session as exposed to the view. The token stays in the cookie.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub is_authenticated: bool,
    pub user: Option<Identity>,
    pub admin: Option<Identity>,
    pub user_type: Option<UserType>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            is_authenticated: session.is_authenticated(),
            user: session.user().cloned(),
            admin: session.admin().cloned(),
            user_type: session.user_type(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub api_url: String,
}

#[derive(Debug, Serialize)]
pub struct NavigationStatus {
    pub loading: bool,
    pub timeout_ms: u64,
}

/// Server-rendered page model: page name, the visitor's session for the
/// navbar and route guards, and the page's own content.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub page: &'static str,
    pub session: SessionView,
    #[serde(flatten)]
    pub content: T,
}

impl<T> Page<T> {
    pub fn new(page: &'static str, session: &Session, content: T) -> Json<Self> {
        Json(Self {
            page,
            session: SessionView::from(session),
            content,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Detail<T> {
    pub item: T,
}

#[derive(Debug, Serialize)]
pub struct HomeContent<C, T, P, R> {
    pub courses: Vec<C>,
    pub trips: Vec<T>,
    pub packages: Vec<P>,
    pub testimonials: Vec<R>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogCard {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub image: Option<String>,
    pub created_at: Option<String>,
}

impl BlogCard {
    const SUMMARY_CHARS: usize = 180;

    pub fn from_post(post: &BlogPost) -> Self {
        Self {
            id: post.id.clone(),
            title: post.title.clone(),
            summary: post.summary(Self::SUMMARY_CHARS),
            image: post.image.clone(),
            created_at: post.created_at.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginContent {
    pub next: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountContent {
    pub profile: Identity,
    pub bookings: Vec<Booking>,
    pub notifications: Vec<Notification>,
    pub unread_notifications: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentContent {
    pub invoice_id: String,
    /// Hosted payment page for the iframe, when the caller passed a safe URL.
    pub payment_url: Option<String>,
    pub status: InvoiceStatus,
    pub settled: bool,
}

#[derive(Debug, Serialize)]
pub struct DashboardContent {
    pub users: usize,
    pub courses: usize,
    pub trips: usize,
    pub packages: usize,
    pub bookings: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}
