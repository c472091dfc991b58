//! Health check.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Name reported by the health check.
pub const SERVICE_NAME: &str = "credit-ledger";

/// Liveness response with the pricing the instance is metering against.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Number of `(model, modality)` prices loaded.
    pub priced_models: usize,
    /// USD value of one credit.
    pub credit_value_usd: f64,
}

/// `GET /health`, unauthenticated.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        priced_models: state.config.pricing.len(),
        credit_value_usd: state.config.conversion.credit_value_usd,
    })
}
