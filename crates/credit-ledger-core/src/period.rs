//! Billing periods: boundaries and the credit grant that opens each one.
//!
//! Boundary detection ([`billing_period`]) is pure date arithmetic. Seeding a
//! new period ([`initialize_period`], [`PeriodSeed::from_previous`]) is a
//! separate step that only needs the tier and the previous period's row.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::ledger::CreditLedgerRow;
use crate::tier::SubscriptionTier;

/// A billing period, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// First day of the period.
    pub start: NaiveDate,
    /// First day of the next period.
    pub end: NaiveDate,
}

impl BillingPeriod {
    /// Whether `day` falls inside the period.
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }
}

fn add_months(anchor: NaiveDate, months: u32) -> NaiveDate {
    // chrono clamps to the last day of shorter months.
    anchor
        .checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// The monthly billing period containing `today` for a user whose periods are
/// anchored on `anchor` (typically the sign-up date).
///
/// Every boundary is computed from the anchor, so an anchor on the 31st yields
/// Feb 28/29 and then returns to Mar 31. Days before the anchor belong to the
/// first period.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn billing_period(anchor: NaiveDate, today: NaiveDate) -> BillingPeriod {
    if today <= anchor {
        return BillingPeriod {
            start: anchor,
            end: add_months(anchor, 1),
        };
    }

    let months = (today.year() - anchor.year()) * 12 + today.month() as i32 - anchor.month() as i32;
    let mut index = u32::try_from(months).unwrap_or(0);
    if add_months(anchor, index) > today {
        index = index.saturating_sub(1);
    }

    BillingPeriod {
        start: add_months(anchor, index),
        end: add_months(anchor, index + 1),
    }
}

/// Start date of the period containing `today`.
#[must_use]
pub fn period_start(anchor: NaiveDate, today: NaiveDate) -> NaiveDate {
    billing_period(anchor, today).start
}

/// Purchased credits that carry into the next period.
///
/// Unspent purchased credits always roll over; subscription credits never do.
#[must_use]
pub fn rollover_credits(previous_purchased_granted: f64, previous_purchased_used: f64) -> f64 {
    (previous_purchased_granted - previous_purchased_used).max(0.0)
}

/// Opening bucket values for a new period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodSeed {
    /// Tier the period was opened under.
    pub tier: SubscriptionTier,
    /// Subscription credits granted.
    pub subscription_granted: f64,
    /// Always zero.
    pub subscription_used: f64,
    /// Purchased credits carried over.
    pub purchased_granted: f64,
    /// Always zero.
    pub purchased_used: f64,
}

/// Compute the opening grant of a period.
///
/// Free tier users receive their grant only on their first period ever, so the
/// free allotment cannot be recharged by waiting. Paid tiers receive the full
/// allotment every period.
#[must_use]
pub fn initialize_period(
    tier: SubscriptionTier,
    rollover_purchased: f64,
    is_first_period_ever: bool,
) -> PeriodSeed {
    let subscription_granted = if tier.is_paid() || is_first_period_ever {
        tier.credits_per_period()
    } else {
        0.0
    };

    PeriodSeed {
        tier,
        subscription_granted,
        subscription_used: 0.0,
        purchased_granted: rollover_purchased.max(0.0),
        purchased_used: 0.0,
    }
}

impl PeriodSeed {
    /// Seed a period from the user's previous row, if any.
    ///
    /// No previous row means this is the user's first period.
    #[must_use]
    pub fn from_previous(tier: SubscriptionTier, previous: Option<&CreditLedgerRow>) -> Self {
        match previous {
            Some(row) => initialize_period(
                tier,
                rollover_credits(row.purchased_granted, row.purchased_used),
                false,
            ),
            None => initialize_period(tier, 0.0, true),
        }
    }
}
