//! Key encoding for the ledger column families.

use chrono::{Datelike, NaiveDate};

use credit_ledger_core::UserId;

const DATE_BYTES: usize = 4;
const USER_BYTES: usize = 16;

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Order-preserving encoding of a calendar day.
///
/// Flipping the sign bit makes big-endian byte order match date order,
/// including dates before the common era.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn encode_date(date: NaiveDate) -> [u8; DATE_BYTES] {
    ((date.num_days_from_ce() as u32) ^ 0x8000_0000).to_be_bytes()
}

/// Inverse of [`encode_date`].
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn decode_date(bytes: [u8; DATE_BYTES]) -> Option<NaiveDate> {
    let days = (u32::from_be_bytes(bytes) ^ 0x8000_0000) as i32;
    NaiveDate::from_num_days_from_ce_opt(days)
}

/// Create a ledger row key.
///
/// Format: `user_id (16 bytes) || period_start (4 bytes)`
#[must_use]
pub fn row_key(user_id: &UserId, period_start: NaiveDate) -> Vec<u8> {
    let mut key = Vec::with_capacity(USER_BYTES + DATE_BYTES);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&encode_date(period_start));
    key
}

/// Create a prefix for iterating all ledger rows of a user.
#[must_use]
pub fn user_rows_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the period start from a ledger row key.
///
/// Returns `None` if the key is malformed.
#[must_use]
pub fn period_start_from_row_key(key: &[u8]) -> Option<NaiveDate> {
    let bytes: [u8; DATE_BYTES] = key.get(USER_BYTES..USER_BYTES + DATE_BYTES)?.try_into().ok()?;
    decode_date(bytes)
}
