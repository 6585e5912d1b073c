//! # divebook
//!
//! Backend-for-frontend server for a diving school booking site.
//!
//! Serves page models and a JSON API for courses, trips, packages, the blog
//! and gallery, customer accounts, bookings and hosted payments, plus an
//! admin back-office. All data lives in the booking REST API; this server
//! only owns the visitor's session cookie.
//!
//! ## Architecture
//!
//! - **Session**: authentication state persisted in the `auth-storage` cookie
//! - **API client**: `reqwest` client attaching the session's bearer token
//! - **Services**: one thin wrapper per backend resource
//! - **Navigation**: page-transition tracking for the loading indicator
//! - **HTTP**: Axum router with rate limiting, request IDs, and graceful shutdown

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

mod api;
mod config;
mod http;
mod navigation;
mod services;
mod session;

use std::net::SocketAddr;

use anyhow::Context;
use axum::serve;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::ApiClient;
use crate::config::{AppConfig, Cli};
use crate::http::{router, AppState};
use crate::navigation::NavigationTracker;
use crate::services::currency::CurrencyConverter;
use crate::services::Services;
use crate::session::CookieSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().context("failed to initialize logging")?;

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli).context("failed to load configuration")?;
    info!(
        bind = %config.bind,
        api_url = %config.api_url,
        currency_api_url = %config.currency_api_url,
        request_timeout = %humantime::format_duration(config.request_timeout),
        cookie_ttl = %humantime::format_duration(config.cookie_ttl),
        secure_cookies = config.secure_cookies,
        navigation_timeout = %humantime::format_duration(config.navigation_timeout),
        max_upload_bytes = config.max_upload_bytes,
        "configuration loaded"
    );

    if !config.secure_cookies {
        warn!("session cookies are sent without the Secure flag; set DIVEBOOK_SECURE_COOKIES=true behind https");
    }

    let client = ApiClient::new(&config.api_url, config.request_timeout)
        .context("failed to build booking api client")?;
    let currency = CurrencyConverter::new(&config.currency_api_url, config.request_timeout)
        .context("failed to build currency client")?;

    let state = AppState {
        services: Services::new(client),
        currency,
        cookies: CookieSettings {
            ttl: config.cookie_ttl,
            secure: config.secure_cookies,
        },
        navigation: NavigationTracker::new(config.navigation_timeout),
        max_upload_bytes: config.max_upload_bytes,
    };

    let app = router(state);
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let shutdown = tokio::signal::ctrl_c();
    info!(bind = %config.bind, "divebook listening");

    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = shutdown.await;
        info!("shutting down gracefully");
    })
    .await
    .context("server exited with error")
}

/// Initialize tracing subscriber with `RUST_LOG` env filter (default: `info`).
fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
