//! Public page models. Each handler answers with the page name, the visitor's
//! session and the data the view renders.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use tracing::debug;

use super::error::ApiError;
use super::responses::{BlogCard, Detail, HomeContent, Listing, LoginContent, NextQuery, Page};
use super::session::{safe_next, SessionContext};
use super::state::AppState;
use crate::services::blog::BlogPost;
use crate::services::courses::Course;
use crate::services::gallery::GalleryImage;
use crate::services::packages::Package;
use crate::services::testimonials::Testimonial;
use crate::services::trips::Trip;
use crate::services::Entity;

type HomePage = Page<HomeContent<Course, Trip, Package, Testimonial>>;

pub async fn home(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<HomePage>, ApiError> {
    let services = &state.services;
    let (courses, trips, packages, testimonials) = (
        services.resource::<Course>(),
        services.resource::<Trip>(),
        services.resource::<Package>(),
        services.resource::<Testimonial>(),
    );
    let (courses, trips, packages, testimonials) = tokio::try_join!(
        courses.list(),
        trips.list(),
        packages.list(),
        testimonials.list(),
    )?;
    debug!(
        courses = courses.len(),
        trips = trips.len(),
        packages = packages.len(),
        "home page loaded"
    );

    Ok(Page::new(
        "home",
        session.state(),
        HomeContent {
            courses,
            trips,
            packages,
            testimonials,
        },
    ))
}

/// Listing page for one collection (`/courses`, `/trips`, `/packages`).
pub async fn catalog<T: Entity>(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<Page<Listing<T>>>, ApiError> {
    let items = state.services.resource::<T>().list().await?;
    debug!(collection = T::SLUG, items = items.len(), "listing page loaded");
    Ok(Page::new(T::SLUG, session.state(), Listing::new(items)))
}

pub async fn detail<T: Entity>(
    State(state): State<AppState>,
    session: SessionContext,
    Path(id): Path<String>,
) -> Result<Json<Page<Detail<T>>>, ApiError> {
    let item = state.services.resource::<T>().get(&id).await?;
    Ok(Page::new(T::SLUG, session.state(), Detail { item }))
}

pub async fn gallery(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<Page<Listing<GalleryImage>>>, ApiError> {
    let images = state.services.gallery().list().await?;
    Ok(Page::new("gallery", session.state(), Listing::new(images)))
}

pub async fn blog(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<Page<Listing<BlogCard>>>, ApiError> {
    let posts = state.services.resource::<BlogPost>().list().await?;
    let cards = posts.iter().map(BlogCard::from_post).collect();
    Ok(Page::new("blog", session.state(), Listing::new(cards)))
}

pub async fn blog_post(
    State(state): State<AppState>,
    session: SessionContext,
    Path(id): Path<String>,
) -> Result<Json<Page<Detail<BlogPost>>>, ApiError> {
    let item = state.services.resource::<BlogPost>().get(&id).await?;
    Ok(Page::new("blog_post", session.state(), Detail { item }))
}

pub async fn login_page(session: SessionContext, Query(query): Query<NextQuery>) -> Response {
    let next = safe_next(query.next.as_deref(), "/account");
    if session.is_user() {
        return Redirect::to(&next).into_response();
    }
    Page::new("login", session.state(), LoginContent { next }).into_response()
}

pub async fn admin_login_page(session: SessionContext, Query(query): Query<NextQuery>) -> Response {
    let next = safe_next(query.next.as_deref(), "/admin");
    if session.is_admin() {
        return Redirect::to(&next).into_response();
    }
    Page::new("admin_login", session.state(), LoginContent { next }).into_response()
}
