//! Account handlers: registration, balance and per-period usage.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use credit_ledger_core::{
    BillingPeriod, CreditBalance, CreditLedgerRow, SubscriptionTier, UsageBook,
};
use credit_ledger_store::AccountProfile;

use super::{parse_user_id, today};
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::metering::MeteringError;
use crate::state::AppState;

/// Register account request.
#[derive(Debug, Deserialize)]
pub struct RegisterAccountRequest {
    /// User ID.
    pub user_id: String,
    /// Subscription tier (`free`, `pro`, `team`, `enterprise`).
    pub tier: String,
    /// Day billing periods are anchored on (default: today).
    pub period_anchor: Option<NaiveDate>,
}

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Current subscription tier.
    pub tier: SubscriptionTier,
    /// Billing period anchor.
    pub period_anchor: NaiveDate,
    /// Current billing period.
    pub period: BillingPeriod,
    /// Balance in the current period.
    pub balance: CreditBalance,
}

/// Register a user, or change the tier of an existing one.
///
/// The anchor of an existing account is kept so period boundaries never move.
/// A tier change applies from the next period the user opens.
pub async fn register_account(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<RegisterAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let tier: SubscriptionTier = body.tier.parse()?;
    let today = today();

    let profile = match state.metering.account(&user_id) {
        Ok(mut existing) => {
            existing.tier = tier;
            existing
        }
        Err(MeteringError::AccountNotFound(_)) => {
            AccountProfile::new(user_id, tier, body.period_anchor.unwrap_or(today))
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(
        service = %auth.service_name,
        user_id = %user_id,
        tier = %tier,
        "Registering account"
    );

    state.metering.register_account(&profile)?;
    let (period, row) = state.metering.current_period(&user_id, today)?;

    Ok(Json(AccountResponse {
        user_id: user_id.to_string(),
        tier: profile.tier,
        period_anchor: profile.period_anchor,
        period,
        balance: row.balance(),
    }))
}

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// User ID.
    pub user_id: String,
    /// Tier the current period was opened under.
    pub tier: SubscriptionTier,
    /// Current billing period.
    pub period: BillingPeriod,
    /// Balance breakdown.
    pub balance: CreditBalance,
}

/// Get the balance of the current period.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let today = today();
    let (period, row) = state.metering.current_period(&user_id, today)?;

    Ok(Json(BalanceResponse {
        user_id: user_id.to_string(),
        tier: row.tier,
        period,
        balance: row.balance(),
    }))
}

/// Usage response: the current period's ledger row.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// User ID.
    pub user_id: String,
    /// Current billing period.
    pub period: BillingPeriod,
    /// Row version.
    pub version: u64,
    /// Balance breakdown.
    pub balance: CreditBalance,
    /// Credits charged across all aggregates this period.
    pub credits_charged: f64,
    /// Per-model usage aggregates.
    pub usage: UsageBook,
}

/// Get the usage aggregates of the current period.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(user_id): Path<String>,
) -> Result<Json<UsageResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let today = today();
    let (period, row) = state.metering.current_period(&user_id, today)?;

    Ok(Json(UsageResponse {
        user_id: user_id.to_string(),
        period,
        version: row.version,
        balance: row.balance(),
        credits_charged: row.usage.total_credits(),
        usage: row.usage,
    }))
}

/// Period history response.
#[derive(Debug, Serialize)]
pub struct PeriodsResponse {
    /// User ID.
    pub user_id: String,
    /// Ledger rows, newest period first.
    pub periods: Vec<CreditLedgerRow>,
}

/// List every period the user has opened.
pub async fn list_periods(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(user_id): Path<String>,
) -> Result<Json<PeriodsResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let periods = state.metering.history(&user_id)?;

    Ok(Json(PeriodsResponse {
        user_id: user_id.to_string(),
        periods,
    }))
}
