//! Core credit metering engine.
//!
//! This crate turns metered AI usage into credits and keeps the per-period
//! two-bucket ledger consistent:
//!
//! - **Pricing**: `PricingTable`, `PriceSpec`, `CreditConversion`
//! - **Cost**: `CostCalculator`, `Cost`
//! - **Balance**: `CreditBalance`, `Deduction`, `compute_balance`, `deduct`
//! - **Periods**: `SubscriptionTier`, `PeriodSeed`, `billing_period`, `rollover_credits`
//! - **Usage**: `UsageEvent`, `UsageKey`, `ModelUsageAggregate`, `fold_usage`
//! - **Ledger**: `CreditLedgerRow`, `UsageBook`
//!
//! # Credits
//!
//! `credits = provider_usd * 1.5 / 0.05` with the default conversion, so a
//! $0.01 text request costs 0.3 credits.
//!
//! Everything here is synchronous and free of I/O. Mutations return new
//! values; persistence and atomicity belong to the caller.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod cost;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod period;
pub mod pricing;
pub mod tier;
pub mod usage;

pub use balance::{
    check_sufficient_credits, compute_balance, covers, deduct, BucketBalance, CreditBalance,
    CreditCheck, Deduction, CREDIT_EPSILON,
};
pub use cost::{token_cost_usd, Cost, CostCalculator};
pub use error::{LedgerError, Result};
pub use ids::{IdError, UserId};
pub use ledger::{CreditLedgerRow, UsageBook, UsageRecord};
pub use period::{
    billing_period, initialize_period, period_start, rollover_credits, BillingPeriod, PeriodSeed,
};
pub use pricing::{
    CreditConversion, Modality, PriceSpec, PricingEntry, PricingKey, PricingTable, TokenRates,
    DEFAULT_CREDIT_VALUE_USD, DEFAULT_MARGIN_MULTIPLIER,
};
pub use tier::{
    SubscriptionTier, ENTERPRISE_TIER_CREDITS, FREE_TIER_CREDITS, PRO_TIER_CREDITS,
    TEAM_TIER_CREDITS,
};
pub use usage::{
    fold_usage, ImageQuality, ImageSize, ModelUsageAggregate, TokenCounts, UsageEvent, UsageKey,
    UsagePayload,
};
