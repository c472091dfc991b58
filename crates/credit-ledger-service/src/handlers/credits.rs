//! Credit handlers: sufficiency checks and purchased credits.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use credit_ledger_core::CreditBalance;

use super::{parse_user_id, today};
use crate::auth::{AdminAuth, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Credit check request.
#[derive(Debug, Deserialize)]
pub struct CheckCreditsRequest {
    /// User ID.
    pub user_id: String,
    /// Credits the caller is about to spend.
    pub required_credits: f64,
}

/// Credit check response.
#[derive(Debug, Serialize)]
pub struct CheckCreditsResponse {
    /// User ID.
    pub user_id: String,
    /// Whether the balance covers the requirement.
    pub has_credits: bool,
    /// Credits that were asked for.
    pub required_credits: f64,
    /// Current balance.
    pub balance: CreditBalance,
}

/// Check whether a user can afford an operation without charging anything.
pub async fn check_credits(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<CheckCreditsRequest>,
) -> Result<Json<CheckCreditsResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let check = state
        .metering
        .check_credits(&user_id, body.required_credits, today())?;

    Ok(Json(CheckCreditsResponse {
        user_id: user_id.to_string(),
        has_credits: check.has_credits,
        required_credits: body.required_credits,
        balance: check.balance,
    }))
}

/// Add purchased credits request (admin only).
#[derive(Debug, Deserialize)]
pub struct AddPurchasedRequest {
    /// User ID.
    pub user_id: String,
    /// Credits bought.
    pub credits: f64,
    /// Reference for the audit log (e.g. payment ID).
    #[serde(default)]
    pub reason: Option<String>,
}

/// Add purchased credits response.
#[derive(Debug, Serialize)]
pub struct AddPurchasedResponse {
    /// User ID.
    pub user_id: String,
    /// Credits added.
    pub credits_added: f64,
    /// Balance after the addition.
    pub balance: CreditBalance,
}

/// Credit an already-paid purchase to the current period.
///
/// Payment collection happens elsewhere; this only records the credits.
pub async fn add_purchased(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<AddPurchasedRequest>,
) -> Result<Json<AddPurchasedResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;

    tracing::info!(
        admin_id = %auth.admin_id,
        user_id = %user_id,
        credits = body.credits,
        reason = ?body.reason,
        "Admin adding purchased credits"
    );

    let balance = state
        .metering
        .add_purchased_credits(&user_id, body.credits, today())?;

    Ok(Json(AddPurchasedResponse {
        user_id: user_id.to_string(),
        credits_added: body.credits,
        balance,
    }))
}
