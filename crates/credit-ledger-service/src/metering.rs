//! Metering: the ledger operations behind the HTTP handlers.
//!
//! Every mutation is a read-modify-write of the user's current ledger row.
//! The row is read, the successor is computed by `credit-ledger-core`, and
//! the write is conditional on the version that was read. A conflicting
//! writer forces the whole sequence to start again from fresh state, up to
//! `max_retries` attempts.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use credit_ledger_core::{
    billing_period, BillingPeriod, Cost, CostCalculator, CreditBalance, CreditCheck,
    CreditLedgerRow, Deduction, LedgerError, PeriodSeed, UsageEvent, UserId,
};
use credit_ledger_store::{AccountProfile, Store, StoreError};

/// Errors from metering operations.
#[derive(Debug, thiserror::Error)]
pub enum MeteringError {
    /// The ledger rejected the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No account profile is registered for the user.
    #[error("account not found: {0}")]
    AccountNotFound(UserId),

    /// Every attempt lost a version race.
    #[error("ledger update abandoned after {attempts} conflicting attempts")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

/// Result type for metering operations.
pub type Result<T> = std::result::Result<T, MeteringError>;

/// Outcome of a charged usage event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageReceipt {
    /// What the event cost.
    pub cost: Cost,
    /// How the charge was split across buckets.
    pub deduction: Deduction,
    /// Balance after the charge.
    pub balance: CreditBalance,
    /// Period the charge landed in.
    pub period: BillingPeriod,
}

/// Ledger operations over a store.
pub struct Metering<S: ?Sized> {
    store: Arc<S>,
    calculator: CostCalculator,
    max_retries: u32,
}

impl<S: Store + ?Sized> Metering<S> {
    /// Create a metering engine. `max_retries` is clamped to at least one.
    #[must_use]
    pub fn new(store: Arc<S>, calculator: CostCalculator, max_retries: u32) -> Self {
        Self {
            store,
            calculator,
            max_retries: max_retries.max(1),
        }
    }

    /// The cost calculator in use.
    #[must_use]
    pub const fn calculator(&self) -> &CostCalculator {
        &self.calculator
    }

    /// Register or update a user's account profile.
    pub fn register_account(&self, profile: &AccountProfile) -> Result<()> {
        self.store.put_account(profile)?;
        tracing::info!(
            user_id = %profile.user_id,
            tier = %profile.tier,
            period_anchor = %profile.period_anchor,
            "Account registered"
        );
        Ok(())
    }

    /// The account profile of a user.
    pub fn account(&self, user_id: &UserId) -> Result<AccountProfile> {
        self.store
            .get_account(user_id)?
            .ok_or(MeteringError::AccountNotFound(*user_id))
    }

    /// The user's ledger row for the period containing `today`.
    pub fn current_row(&self, user_id: &UserId, today: NaiveDate) -> Result<CreditLedgerRow> {
        Ok(self.current_period(user_id, today)?.1)
    }

    /// The billing period containing `today` and the user's row for it.
    ///
    /// Opens the period on first access: the grant follows the user's tier
    /// and unspent purchased credits roll over from the latest earlier row.
    /// If another writer opens the same period first, its row is returned.
    pub fn current_period(
        &self,
        user_id: &UserId,
        today: NaiveDate,
    ) -> Result<(BillingPeriod, CreditLedgerRow)> {
        let profile = self.account(user_id)?;
        let period = billing_period(profile.period_anchor, today);
        let start = period.start;

        if let Some(row) = self.store.get_row(user_id, start)? {
            return Ok((period, row));
        }

        let previous = self.store.latest_row_before(user_id, start)?;
        let seed = PeriodSeed::from_previous(profile.tier, previous.as_ref());
        let row = CreditLedgerRow::open(*user_id, start, seed);

        match self.store.create_row(&row) {
            Ok(()) => {
                tracing::info!(
                    user_id = %user_id,
                    period_start = %start,
                    tier = %seed.tier,
                    subscription_granted = seed.subscription_granted,
                    rollover = seed.purchased_granted,
                    "Opened billing period"
                );
                Ok((period, row))
            }
            Err(StoreError::AlreadyExists { .. }) => {
                tracing::debug!(
                    user_id = %user_id,
                    period_start = %start,
                    "Period opened concurrently"
                );
                let row = self.store.get_row(user_id, start)?.ok_or_else(|| {
                    StoreError::NotFound {
                        entity: "ledger row",
                        id: format!("{user_id}/{start}"),
                    }
                })?;
                Ok((period, row))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The user's balance in the period containing `today`.
    pub fn balance(&self, user_id: &UserId, today: NaiveDate) -> Result<CreditBalance> {
        Ok(self.current_row(user_id, today)?.balance())
    }

    /// Whether the user can cover `required` credits right now.
    pub fn check_credits(
        &self,
        user_id: &UserId,
        required: f64,
        today: NaiveDate,
    ) -> Result<CreditCheck> {
        credit_ledger_core::balance::validate_amount(required)?;
        Ok(self.current_row(user_id, today)?.check_sufficient_credits(required))
    }

    /// Price an event without charging it.
    pub fn estimate(&self, event: &UsageEvent) -> Result<Cost> {
        Ok(self.calculator.calculate_cost(event)?)
    }

    /// Charge a usage event to the user's current period.
    ///
    /// On `InsufficientCredits` the stored row is left untouched.
    pub fn record_usage(
        &self,
        user_id: &UserId,
        event: &UsageEvent,
        today: NaiveDate,
    ) -> Result<UsageReceipt> {
        let cost = self.calculator.calculate_cost(event).map_err(|e| {
            if let LedgerError::PricingMissing { model, modality } = &e {
                tracing::error!(model = %model, modality = %modality, "No price configured");
            }
            e
        })?;

        let (period, row, deduction) = self.update_current_row(user_id, today, |row| {
            row.apply_usage(event, &cost).map_err(|e| {
                if let LedgerError::InsufficientCredits {
                    available,
                    required,
                } = &e
                {
                    tracing::info!(
                        user_id = %user_id,
                        available = *available,
                        required = *required,
                        model = %event.model,
                        "Usage rejected: insufficient credits"
                    );
                }
                e
            })
        })?;

        tracing::info!(
            user_id = %user_id,
            model = %event.model,
            modality = %event.modality(),
            credits = cost.credits,
            from_subscription = deduction.from_subscription,
            from_purchased = deduction.from_purchased,
            "Usage recorded"
        );

        Ok(UsageReceipt {
            cost,
            deduction,
            balance: row.balance(),
            period,
        })
    }

    /// Add already-paid purchased credits to the user's current period.
    pub fn add_purchased_credits(
        &self,
        user_id: &UserId,
        credits: f64,
        today: NaiveDate,
    ) -> Result<CreditBalance> {
        let now = chrono::Utc::now();
        let (_, row, ()) = self.update_current_row(user_id, today, |row| {
            row.add_purchased(credits, now).map(|next| (next, ()))
        })?;

        tracing::info!(
            user_id = %user_id,
            credits = credits,
            purchased_granted = row.purchased_granted,
            "Purchased credits added"
        );

        Ok(row.balance())
    }

    /// All of a user's ledger rows, newest period first.
    pub fn history(&self, user_id: &UserId) -> Result<Vec<CreditLedgerRow>> {
        self.account(user_id)?;
        Ok(self.store.list_rows(user_id)?)
    }

    /// Apply `mutate` to the current row and write it back atomically,
    /// retrying from a fresh read when another writer got there first.
    ///
    /// Nothing is read after a successful write, so an error here always
    /// means the row was left unchanged.
    fn update_current_row<T>(
        &self,
        user_id: &UserId,
        today: NaiveDate,
        mutate: impl Fn(&CreditLedgerRow) -> std::result::Result<(CreditLedgerRow, T), LedgerError>,
    ) -> Result<(BillingPeriod, CreditLedgerRow, T)> {
        for attempt in 1..=self.max_retries {
            let (period, row) = self.current_period(user_id, today)?;
            let (next, outcome) = mutate(&row)?;

            match self.store.update_row(&next, row.version) {
                Ok(()) => return Ok((period, next, outcome)),
                Err(e) if e.is_conflict() => {
                    tracing::debug!(
                        user_id = %user_id,
                        period_start = %row.period_start,
                        attempt,
                        "Ledger row changed during update, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(
            user_id = %user_id,
            attempts = self.max_retries,
            "Ledger update abandoned after repeated conflicts"
        );
        Err(MeteringError::RetriesExhausted {
            attempts: self.max_retries,
        })
    }
}
