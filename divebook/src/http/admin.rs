//! Admin panel: dashboard pages plus the JSON management API under
//! `/api/admin`. Every handler requires an admin session.

use std::collections::BTreeMap;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::error::ApiError;
use super::responses::{mutation, DashboardContent, Listing, Mutation, Page, Toast};
use super::session::RequireAdmin;
use super::state::AppState;
use crate::api::Auth;
use crate::services::blog::BlogPost;
use crate::services::bookings::Booking;
use crate::services::coupons::Coupon;
use crate::services::courses::Course;
use crate::services::gallery::{GalleryImage, ImageUpload};
use crate::services::notifications::Notification;
use crate::services::packages::Package;
use crate::services::testimonials::Testimonial;
use crate::services::trips::Trip;
use crate::services::users::Registration;
use crate::services::Entity;
use crate::session::Identity;

/// JSON management routes. Uploads larger than `max_upload_bytes` are
/// refused with 413.
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(resource_routes::<Course>())
        .merge(resource_routes::<Trip>())
        .merge(resource_routes::<Package>())
        .merge(resource_routes::<BlogPost>())
        .merge(resource_routes::<Coupon>())
        .merge(resource_routes::<Testimonial>())
        .merge(resource_routes::<Notification>())
        .merge(resource_routes::<Booking>())
        .route(
            "/api/admin/gallery",
            get(gallery)
                .post(upload_image)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/admin/gallery/{id}", delete(delete_image))
        .route("/api/admin/users", get(users))
        .route("/api/admin/admins", get(admins).post(create_admin))
        .route("/api/admin/admins/{id}", delete(delete_admin))
}

fn resource_routes<T: Entity>() -> Router<AppState> {
    let collection = format!("/api/admin/{}", T::SLUG);
    let item = format!("{collection}/{{id}}");
    Router::new()
        .route(&collection, get(list::<T>).post(create::<T>))
        .route(&item, put(update::<T>).delete(remove::<T>))
}

pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
) -> Result<Json<Page<DashboardContent>>, ApiError> {
    let auth = Auth::Session(session.state());
    let services = &state.services;
    let (admins, courses, trips, packages, bookings) = (
        services.admins(),
        services.resource::<Course>(),
        services.resource::<Trip>(),
        services.resource::<Package>(),
        services.resource::<Booking>(),
    );

    let (users, courses, trips, packages, bookings) = tokio::try_join!(
        admins.all_users(auth),
        courses.list(),
        trips.list(),
        packages.list(),
        bookings.list_with(auth),
    )?;

    Ok(Page::new(
        "admin_dashboard",
        session.state(),
        DashboardContent {
            users: users.len(),
            courses: courses.len(),
            trips: trips.len(),
            packages: packages.len(),
            bookings: bookings.len(),
        },
    ))
}

pub async fn users_page(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
) -> Result<Json<Page<Listing<Identity>>>, ApiError> {
    let users = state
        .services
        .admins()
        .all_users(Auth::Session(session.state()))
        .await?;
    Ok(Page::new("admin_users", session.state(), Listing::new(users)))
}

/// Query parameters (`?status=pending`, `?page=2`) are forwarded to the
/// backend as filters.
async fn list<T: Entity>(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    Query(filters): Query<BTreeMap<String, String>>,
) -> Result<Json<Vec<T>>, ApiError> {
    let resource = state.services.resource::<T>();
    let auth = Auth::Session(session.state());
    let items = if filters.is_empty() {
        resource.list_with(auth).await?
    } else {
        resource.search(&filters, auth).await?
    };
    Ok(Json(items))
}

async fn create<T: Entity>(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    Json(item): Json<T>,
) -> Result<Json<Mutation<T>>, ApiError> {
    let created = state
        .services
        .resource::<T>()
        .create(&item, Auth::Session(session.state()))
        .await?;
    info!(collection = T::SLUG, id = created.id(), "record created");
    Ok(mutation(created, Toast::success(format!("{} created", T::LABEL))))
}

async fn update<T: Entity>(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    Path(id): Path<String>,
    Json(item): Json<T>,
) -> Result<Json<Mutation<T>>, ApiError> {
    let updated = state
        .services
        .resource::<T>()
        .update(&id, &item, Auth::Session(session.state()))
        .await?;
    info!(collection = T::SLUG, id = %id, "record updated");
    Ok(mutation(updated, Toast::success(format!("{} updated", T::LABEL))))
}

async fn remove<T: Entity>(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<Mutation<Value>>, ApiError> {
    state
        .services
        .resource::<T>()
        .delete(&id, Auth::Session(session.state()))
        .await?;
    info!(collection = T::SLUG, id = %id, "record deleted");
    Ok(mutation(
        json!({ "id": id }),
        Toast::success(format!("{} deleted", T::LABEL)),
    ))
}

async fn gallery(
    State(state): State<AppState>,
    RequireAdmin(_session): RequireAdmin,
) -> Result<Json<Vec<GalleryImage>>, ApiError> {
    Ok(Json(state.services.gallery().list().await?))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge;
    }
    warn!(error = %err, "malformed upload");
    ApiError::bad_request(err.body_text())
}

/// Accepts `image` (file) with optional `title` and `caption` text fields.
async fn upload_image(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    mut multipart: Multipart,
) -> Result<Json<Mutation<GalleryImage>>, ApiError> {
    let mut file: Option<(String, Option<String>, Bytes)> = None;
    let mut title = None;
    let mut caption = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, content_type, bytes));
            }
            Some("title") => title = Some(field.text().await.map_err(multipart_error)?),
            Some("caption") => caption = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| ApiError::bad_request("an image file is required"))?;
    let mut upload = ImageUpload::new(&file_name, content_type.as_deref(), bytes)?;
    upload.title = title.filter(|value| !value.trim().is_empty());
    upload.caption = caption.filter(|value| !value.trim().is_empty());

    info!(
        file_name = upload.file_name(),
        content_type = upload.content_type(),
        bytes = upload.len(),
        "uploading gallery image"
    );
    let image = state
        .services
        .gallery()
        .upload(upload, Auth::Session(session.state()))
        .await?;
    Ok(mutation(image, Toast::success("Image uploaded")))
}

async fn delete_image(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<Mutation<Value>>, ApiError> {
    state
        .services
        .gallery()
        .delete(&id, Auth::Session(session.state()))
        .await?;
    Ok(mutation(json!({ "id": id }), Toast::success("Image deleted")))
}

async fn users(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
) -> Result<Json<Vec<Identity>>, ApiError> {
    let users = state
        .services
        .admins()
        .all_users(Auth::Session(session.state()))
        .await?;
    Ok(Json(users))
}

async fn admins(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
) -> Result<Json<Vec<Identity>>, ApiError> {
    let admins = state
        .services
        .admins()
        .list(Auth::Session(session.state()))
        .await?;
    Ok(Json(admins))
}

async fn create_admin(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    Json(registration): Json<Registration>,
) -> Result<Json<Mutation<Identity>>, ApiError> {
    if registration.email.trim().is_empty() || registration.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }
    let admin = state
        .services
        .admins()
        .register(&registration, Auth::Session(session.state()))
        .await?;
    info!(email = %registration.email, "admin account created");
    Ok(mutation(admin, Toast::success("Admin account created")))
}

async fn delete_admin(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<Mutation<Value>>, ApiError> {
    if session.state().admin().is_some_and(|admin| admin.id == id) {
        return Err(ApiError::Conflict(String::from(
            "you cannot delete your own admin account",
        )));
    }
    state
        .services
        .admins()
        .delete(&id, Auth::Session(session.state()))
        .await?;
    info!(admin_id = %id, "admin account deleted");
    Ok(mutation(json!({ "id": id }), Toast::success("Admin removed")))
}
