//! HTTP layer: Axum router, page models, the JSON API and session guards.
//!
//! Pages answer with JSON page models and run behind the navigation tracker.
//! `/api/*` routes proxy the booking API with the visitor's bearer token.

mod account;
mod admin;
mod auth;
mod error;
mod handlers;
mod pages;
mod responses;
mod session;
mod state;


pub use handlers::router;
pub use state::AppState;
