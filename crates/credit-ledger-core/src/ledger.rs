//! The per-user, per-period credit ledger row.
//!
//! Every mutation returns a new row and leaves `self` untouched, so a caller
//! can run read -> cost -> deduct -> fold -> write as one optimistic
//! transaction: on any error nothing has changed, and on success the new row
//! carries `version + 1` for the store's compare-and-swap.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::balance::{self, CreditBalance, CreditCheck, Deduction, CREDIT_EPSILON};
use crate::cost::Cost;
use crate::error::Result;
use crate::ids::UserId;
use crate::period::PeriodSeed;
use crate::tier::SubscriptionTier;
use crate::usage::{fold_usage, ModelUsageAggregate, UsageEvent, UsageKey};

/// One aggregate with its key, the persisted form of a [`UsageBook`] entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Which model / modality / image variant.
    pub key: UsageKey,
    /// Running totals.
    pub aggregate: ModelUsageAggregate,
}

/// Aggregates of one period, keyed by [`UsageKey`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<UsageRecord>", into = "Vec<UsageRecord>")]
pub struct UsageBook {
    entries: BTreeMap<UsageKey, ModelUsageAggregate>,
}

impl UsageBook {
    /// Aggregate for a key, if any event has been folded into it.
    #[must_use]
    pub fn get(&self, key: &UsageKey) -> Option<&ModelUsageAggregate> {
        self.entries.get(key)
    }

    /// Iterate over all aggregates in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&UsageKey, &ModelUsageAggregate)> {
        self.entries.iter()
    }

    /// Number of aggregates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no usage has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold an event into the aggregate it belongs to, creating it if needed.
    pub fn record(&mut self, event: &UsageEvent, cost: &Cost) {
        let key = UsageKey::for_event(event);
        let current = self.entries.get(&key).cloned().unwrap_or_default();
        self.entries.insert(key, fold_usage(&current, event, cost));
    }

    /// Total credits charged across all aggregates.
    #[must_use]
    pub fn total_credits(&self) -> f64 {
        self.entries.values().map(|a| a.total_credits).sum()
    }
}

impl From<Vec<UsageRecord>> for UsageBook {
    fn from(records: Vec<UsageRecord>) -> Self {
        Self {
            entries: records.into_iter().map(|r| (r.key, r.aggregate)).collect(),
        }
    }
}

impl From<UsageBook> for Vec<UsageRecord> {
    fn from(book: UsageBook) -> Self {
        book.entries
            .into_iter()
            .map(|(key, aggregate)| UsageRecord { key, aggregate })
            .collect()
    }
}

/// Credits and usage of one user for one billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditLedgerRow {
    /// Owner of the row.
    pub user_id: UserId,
    /// First day of the billing period.
    pub period_start: NaiveDate,
    /// Tier the period was opened under.
    pub tier: SubscriptionTier,
    /// Subscription credits granted for the period.
    pub subscription_granted: f64,
    /// Subscription credits spent.
    pub subscription_used: f64,
    /// Purchased credits available in the period (including rollover).
    pub purchased_granted: f64,
    /// Purchased credits spent.
    pub purchased_used: f64,
    /// Per-model usage aggregates.
    #[serde(default)]
    pub usage: UsageBook,
    /// Incremented by every mutation; used for optimistic concurrency.
    pub version: u64,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl CreditLedgerRow {
    /// Open a new row from a period seed.
    #[must_use]
    pub fn open(user_id: UserId, period_start: NaiveDate, seed: PeriodSeed) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            period_start,
            tier: seed.tier,
            subscription_granted: seed.subscription_granted,
            subscription_used: seed.subscription_used,
            purchased_granted: seed.purchased_granted,
            purchased_used: seed.purchased_used,
            usage: UsageBook::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Panic if the row violates `0 <= used <= granted` in either bucket.
    ///
    /// A violation means an upstream read-modify-write was not atomic. The
    /// row must not be silently corrected.
    ///
    /// # Panics
    ///
    /// Panics on any invariant violation.
    pub fn assert_invariants(&self) {
        for (bucket, granted, used) in [
            ("subscription", self.subscription_granted, self.subscription_used),
            ("purchased", self.purchased_granted, self.purchased_used),
        ] {
            assert!(
                granted.is_finite() && used.is_finite() && granted >= 0.0 && used >= 0.0,
                "ledger row {}/{} has invalid {bucket} bucket: granted={granted}, used={used}",
                self.user_id,
                self.period_start,
            );
            assert!(
                used <= granted + CREDIT_EPSILON,
                "ledger row {}/{} overspent {bucket} credits: granted={granted}, used={used}",
                self.user_id,
                self.period_start,
            );
        }
    }

    /// The balance breakdown of this row.
    ///
    /// # Panics
    ///
    /// Panics if the row violates its invariants.
    #[must_use]
    pub fn balance(&self) -> CreditBalance {
        self.assert_invariants();
        balance::compute_balance(
            self.subscription_granted,
            self.subscription_used,
            self.purchased_granted,
            self.purchased_used,
        )
    }

    /// Whether the row can cover `required` credits.
    ///
    /// # Panics
    ///
    /// Panics if the row violates its invariants.
    #[must_use]
    pub fn check_sufficient_credits(&self, required: f64) -> CreditCheck {
        balance::check_sufficient_credits(self.balance(), required)
    }

    /// Plan a deduction against this row without applying it.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAmount` for negative or non-finite amounts.
    /// - `LedgerError::InsufficientCredits` if both buckets together are short.
    ///
    /// # Panics
    ///
    /// Panics if the row violates its invariants.
    pub fn deduct(&self, credits: f64) -> Result<Deduction> {
        self.assert_invariants();
        balance::deduct(
            self.subscription_granted,
            self.subscription_used,
            self.purchased_granted,
            self.purchased_used,
            credits,
        )
    }

    /// Charge a priced usage event and fold it into the usage aggregates.
    ///
    /// Returns the new row and how the charge was split. `self` is unchanged
    /// whether or not the call succeeds.
    ///
    /// # Errors
    ///
    /// Same as [`deduct`](Self::deduct).
    ///
    /// # Panics
    ///
    /// Panics if the row violates its invariants.
    pub fn apply_usage(&self, event: &UsageEvent, cost: &Cost) -> Result<(Self, Deduction)> {
        let deduction = self.deduct(cost.credits)?;

        let mut next = self.clone();
        next.subscription_used = spend(
            self.subscription_granted,
            self.subscription_used,
            deduction.from_subscription,
            deduction.subscription_remaining,
        );
        next.purchased_used = spend(
            self.purchased_granted,
            self.purchased_used,
            deduction.from_purchased,
            deduction.purchased_remaining,
        );
        next.usage.record(event, cost);
        next.touch(event.occurred_at);

        next.assert_invariants();
        Ok((next, deduction))
    }

    /// Add purchased credits to the row.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` for negative or non-finite amounts.
    pub fn add_purchased(&self, credits: f64, at: DateTime<Utc>) -> Result<Self> {
        balance::validate_amount(credits)?;
        let mut next = self.clone();
        next.purchased_granted += credits;
        next.touch(at);
        Ok(next)
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = at.max(self.updated_at);
    }
}

/// New `used` after spending `amount`; a drained bucket lands exactly on its
/// grant so rounding never leaves `used > granted`.
fn spend(granted: f64, used: f64, amount: f64, remaining: f64) -> f64 {
    if remaining <= 0.0 {
        granted
    } else {
        used + amount
    }
}
