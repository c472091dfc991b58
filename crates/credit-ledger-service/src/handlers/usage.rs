//! Usage handlers: reporting and estimating metered events.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use credit_ledger_core::{BillingPeriod, CreditBalance, Deduction, Modality, UsageEvent};

use super::{parse_user_id, today};
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Usage report from a service.
#[derive(Debug, Deserialize)]
pub struct ReportUsageRequest {
    /// User ID being charged.
    pub user_id: String,
    /// The completed operation.
    pub event: UsageEvent,
}

/// Usage report response.
#[derive(Debug, Serialize)]
pub struct ReportUsageResponse {
    /// Whether the usage was charged.
    pub success: bool,
    /// Provider cost in USD.
    pub cost_usd: f64,
    /// Credits charged.
    pub credits: f64,
    /// How the charge was split.
    pub deduction: Deduction,
    /// Balance after the charge.
    pub balance: CreditBalance,
    /// Period the charge landed in.
    pub period: BillingPeriod,
}

/// Report a completed usage event and charge it.
pub async fn report_usage(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<ReportUsageRequest>,
) -> Result<Json<ReportUsageResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;

    tracing::debug!(
        service = %auth.service_name,
        user_id = %user_id,
        model = %body.event.model,
        "Processing usage event"
    );

    let receipt = state.metering.record_usage(&user_id, &body.event, today())?;

    Ok(Json(ReportUsageResponse {
        success: true,
        cost_usd: receipt.cost.usd,
        credits: receipt.cost.credits,
        deduction: receipt.deduction,
        balance: receipt.balance,
        period: receipt.period,
    }))
}

/// Cost estimate response.
#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    /// Model priced.
    pub model: String,
    /// Modality priced.
    pub modality: Modality,
    /// Provider cost in USD.
    pub cost_usd: f64,
    /// Credits the event would cost.
    pub credits: f64,
}

/// Price an event without charging anyone.
pub async fn estimate_usage(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(event): Json<UsageEvent>,
) -> Result<Json<EstimateResponse>, ApiError> {
    let cost = state.metering.estimate(&event)?;

    Ok(Json(EstimateResponse {
        modality: event.modality(),
        model: event.model,
        cost_usd: cost.usd,
        credits: cost.credits,
    }))
}
