//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, credits, health, usage};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for usage endpoints.
/// This prevents overload from high-volume usage reporting.
const USAGE_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Accounts (Service API Key auth)
/// - `POST /v1/accounts` - Register a user (tier and period anchor)
/// - `GET /v1/accounts/:user_id/balance` - Current period balance
/// - `GET /v1/accounts/:user_id/usage` - Current period usage aggregates
/// - `GET /v1/accounts/:user_id/periods` - Every opened period, newest first
///
/// ## Credits
/// - `POST /v1/credits/check` - Check a requirement without charging (service)
/// - `POST /v1/credits/purchased` - Add purchased credits (admin)
///
/// ## Usage (Service API Key auth, rate-limited)
/// - `POST /v1/usage` - Report and charge a usage event
/// - `POST /v1/usage/estimate` - Price a usage event
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let usage_routes = Router::new()
        .route("/", post(usage::report_usage))
        .route("/estimate", post(usage::estimate_usage))
        .layer(ConcurrencyLimitLayer::new(USAGE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::register_account))
        .route("/accounts/:user_id/balance", get(accounts::get_balance))
        .route("/accounts/:user_id/usage", get(accounts::get_usage))
        .route("/accounts/:user_id/periods", get(accounts::list_periods))
        // Credits
        .route("/credits/check", post(credits::check_credits))
        .route("/credits/purchased", post(credits::add_purchased))
        // Usage routes (with their own concurrency limit)
        .nest("/usage", usage_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
