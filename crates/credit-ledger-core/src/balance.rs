//! Two-bucket credit balances and priority deduction.
//!
//! A ledger row carries two buckets: credits granted by the subscription and
//! credits the user purchased. Spending always drains the subscription bucket
//! first, since unspent purchased credits roll over and subscription credits
//! expire at period end.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Tolerance for floating-point comparisons of credit amounts.
pub const CREDIT_EPSILON: f64 = 1e-9;

/// Whether `available` credits cover `required`, allowing for the rounding
/// drift that accumulates over many fractional charges.
#[must_use]
pub fn covers(available: f64, required: f64) -> bool {
    available + CREDIT_EPSILON >= required
}

/// Remaining credits below the tolerance count as an empty bucket.
fn settle(remaining: f64) -> f64 {
    if remaining <= CREDIT_EPSILON {
        0.0
    } else {
        remaining
    }
}

/// One bucket of a balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketBalance {
    /// Credits granted to the bucket this period.
    pub available: f64,
    /// Credits spent from the bucket.
    pub used: f64,
    /// `available - used`.
    pub remaining: f64,
}

/// Balance breakdown derived from a ledger row. Never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Subscription bucket.
    pub subscription: BucketBalance,
    /// Purchased bucket.
    pub purchased: BucketBalance,
    /// Credits granted across both buckets.
    pub total_available: f64,
    /// Credits used across both buckets.
    pub total_used: f64,
    /// Credits remaining across both buckets.
    pub total_remaining: f64,
}

/// Compute the balance breakdown from the four bucket scalars.
///
/// No clamping is applied; callers never hold a state where `used > granted`.
#[must_use]
pub fn compute_balance(
    subscription_granted: f64,
    subscription_used: f64,
    purchased_granted: f64,
    purchased_used: f64,
) -> CreditBalance {
    let subscription_remaining = subscription_granted - subscription_used;
    let purchased_remaining = purchased_granted - purchased_used;

    CreditBalance {
        subscription: BucketBalance {
            available: subscription_granted,
            used: subscription_used,
            remaining: subscription_remaining,
        },
        purchased: BucketBalance {
            available: purchased_granted,
            used: purchased_used,
            remaining: purchased_remaining,
        },
        total_available: subscription_granted + purchased_granted,
        total_used: subscription_used + purchased_used,
        total_remaining: subscription_remaining + purchased_remaining,
    }
}

/// Result of a pre-flight credit check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditCheck {
    /// Whether the remaining balance covers the requirement.
    pub has_credits: bool,
    /// The balance the check was made against.
    pub balance: CreditBalance,
}

/// Check whether a balance covers `required` credits.
#[must_use]
pub fn check_sufficient_credits(balance: CreditBalance, required: f64) -> CreditCheck {
    CreditCheck {
        has_credits: covers(balance.total_remaining, required),
        balance,
    }
}

/// How a deduction was split across the buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Deduction {
    /// Credits taken from the subscription bucket.
    pub from_subscription: f64,
    /// Credits taken from the purchased bucket.
    pub from_purchased: f64,
    /// Subscription credits left afterwards.
    pub subscription_remaining: f64,
    /// Purchased credits left afterwards.
    pub purchased_remaining: f64,
}

impl Deduction {
    /// Total credits deducted.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.from_subscription + self.from_purchased
    }
}

/// Validate a credit amount supplied by a caller.
///
/// # Errors
///
/// Returns `LedgerError::InvalidAmount` if the amount is negative, NaN or
/// infinite.
pub fn validate_amount(credits: f64) -> Result<()> {
    if credits.is_finite() && credits >= 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(format!(
            "credit amount must be a finite non-negative number, got {credits}"
        )))
    }
}

/// Split a deduction across the buckets, subscription first.
///
/// Fails without deducting anything if both buckets together cannot cover the
/// amount.
///
/// # Errors
///
/// - `LedgerError::InvalidAmount` if `credits` is negative or not finite.
/// - `LedgerError::InsufficientCredits` if the remaining balance is too low.
pub fn deduct(
    subscription_granted: f64,
    subscription_used: f64,
    purchased_granted: f64,
    purchased_used: f64,
    credits: f64,
) -> Result<Deduction> {
    validate_amount(credits)?;

    let subscription_available = subscription_granted - subscription_used;
    let purchased_available = purchased_granted - purchased_used;
    let available = subscription_available + purchased_available;

    if !covers(available, credits) {
        return Err(LedgerError::InsufficientCredits {
            available,
            required: credits,
        });
    }

    let from_subscription = subscription_available.min(credits).max(0.0);
    // Clamp so rounding never pushes the purchased bucket past its grant.
    let from_purchased = (credits - from_subscription).min(purchased_available).max(0.0);

    Ok(Deduction {
        from_subscription,
        from_purchased,
        subscription_remaining: settle(subscription_available - from_subscription),
        purchased_remaining: settle(purchased_available - from_purchased),
    })
}
