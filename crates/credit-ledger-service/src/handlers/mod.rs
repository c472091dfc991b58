//! API handlers.

pub mod accounts;
pub mod credits;
pub mod health;
pub mod usage;

use chrono::{NaiveDate, Utc};

use credit_ledger_core::UserId;

use crate::error::ApiError;

/// Parse a user ID from a request field or path segment.
pub(crate) fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))
}

/// The calendar day requests are billed against.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
