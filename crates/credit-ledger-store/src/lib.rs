//! Storage layer for the credit ledger.
//!
//! Ledger rows are stored one per user per billing period. Writers follow an
//! optimistic read-modify-write cycle: read a row, compute the successor with
//! `credit-ledger-core`, and write it back with the version they read. A
//! concurrent writer makes the write fail with [`StoreError::VersionConflict`]
//! and the caller retries against fresh state.
//!
//! # Backends
//!
//! - [`MemoryStore`]: process-local maps, always available
//! - `RocksStore`: persistent `RocksDB` storage with column families
//!   (`rocksdb-backend` feature)
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use credit_ledger_core::{CreditLedgerRow, PeriodSeed, SubscriptionTier, UserId};
//! use credit_ledger_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//! let start = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//!
//! let row = CreditLedgerRow::open(
//!     user_id,
//!     start,
//!     PeriodSeed::from_previous(SubscriptionTier::Pro, None),
//! );
//! store.create_row(&row).unwrap();
//!
//! let stored = store.get_row(&user_id, start).unwrap().unwrap();
//! assert_eq!(stored.subscription_granted, 1000.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use account::AccountProfile;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::NaiveDate;
use credit_ledger_core::{CreditLedgerRow, UserId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert or update an account profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &AccountProfile) -> Result<()>;

    /// Get an account profile by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<AccountProfile>>;

    // =========================================================================
    // Ledger Row Operations
    // =========================================================================

    /// Get the ledger row of a user for the period starting on `period_start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_row(&self, user_id: &UserId, period_start: NaiveDate)
        -> Result<Option<CreditLedgerRow>>;

    /// Insert a new ledger row.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if a row for the same user and
    /// period is already stored.
    fn create_row(&self, row: &CreditLedgerRow) -> Result<()>;

    /// Replace a stored ledger row, provided it still has `expected_version`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if no row exists for the user and period.
    /// - `StoreError::VersionConflict` if the stored version differs.
    fn update_row(&self, row: &CreditLedgerRow, expected_version: u64) -> Result<()>;

    /// The most recent row of a user whose period starts strictly before
    /// `period_start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn latest_row_before(
        &self,
        user_id: &UserId,
        period_start: NaiveDate,
    ) -> Result<Option<CreditLedgerRow>>;

    /// List all rows of a user, newest period first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_rows(&self, user_id: &UserId) -> Result<Vec<CreditLedgerRow>>;
}

/// Behaviour every backend must share, run against each implementation.
#[cfg(test)]
pub(crate) mod conformance {
    use chrono::{NaiveDate, Utc};
    use credit_ledger_core::{
        Cost, CreditLedgerRow, PeriodSeed, SubscriptionTier, UsageEvent, UserId,
    };

    use crate::{AccountProfile, Store, StoreError};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn open_row(user_id: UserId, start: NaiveDate) -> CreditLedgerRow {
        CreditLedgerRow::open(
            user_id,
            start,
            PeriodSeed::from_previous(SubscriptionTier::Pro, None),
        )
    }

    pub fn account_roundtrip(store: &impl Store) {
        let user_id = UserId::generate();
        assert!(store.get_account(&user_id).unwrap().is_none());

        let mut account = AccountProfile::new(user_id, SubscriptionTier::Free, date(2024, 1, 15));
        store.put_account(&account).unwrap();
        assert_eq!(store.get_account(&user_id).unwrap(), Some(account.clone()));

        account.tier = SubscriptionTier::Team;
        store.put_account(&account).unwrap();
        let stored = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(stored.tier, SubscriptionTier::Team);
    }

    pub fn create_then_get(store: &impl Store) {
        let user_id = UserId::generate();
        let start = date(2024, 1, 15);
        assert!(store.get_row(&user_id, start).unwrap().is_none());

        let row = open_row(user_id, start);
        store.create_row(&row).unwrap();

        let stored = store.get_row(&user_id, start).unwrap().unwrap();
        assert_eq!(stored.version, 0);
        assert_eq!(stored.subscription_granted, 1000.0);
        assert!(store.get_row(&user_id, date(2024, 2, 15)).unwrap().is_none());
    }

    pub fn duplicate_create_is_rejected(store: &impl Store) {
        let user_id = UserId::generate();
        let row = open_row(user_id, date(2024, 1, 15));
        store.create_row(&row).unwrap();

        let err = store.create_row(&row).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    pub fn update_checks_version(store: &impl Store) {
        let user_id = UserId::generate();
        let start = date(2024, 1, 15);
        let row = open_row(user_id, start);
        store.create_row(&row).unwrap();

        let event = UsageEvent::flat_rate("replicate", 1);
        let cost = Cost { usd: 0.02, credits: 0.6 };
        let (next, _) = row.apply_usage(&event, &cost).unwrap();
        store.update_row(&next, row.version).unwrap();

        // A writer that read the original row loses.
        let (stale, _) = row.apply_usage(&event, &cost).unwrap();
        let err = store.update_row(&stale, row.version).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                found: 1
            }
        ));

        let stored = store.get_row(&user_id, start).unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.usage.len(), 1);
    }

    pub fn update_missing_row_is_not_found(store: &impl Store) {
        let row = open_row(UserId::generate(), date(2024, 1, 15));
        let err = store.update_row(&row, 0).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    pub fn latest_row_before_skips_current_and_other_users(store: &impl Store) {
        let user_id = UserId::generate();
        let other = UserId::generate();

        for start in [date(2024, 1, 15), date(2024, 2, 15), date(2024, 4, 15)] {
            store.create_row(&open_row(user_id, start)).unwrap();
        }
        store.create_row(&open_row(other, date(2024, 3, 15))).unwrap();

        let previous = store
            .latest_row_before(&user_id, date(2024, 4, 15))
            .unwrap()
            .unwrap();
        assert_eq!(previous.period_start, date(2024, 2, 15));

        let previous = store
            .latest_row_before(&user_id, date(2024, 3, 15))
            .unwrap()
            .unwrap();
        assert_eq!(previous.period_start, date(2024, 2, 15));

        assert!(store
            .latest_row_before(&user_id, date(2024, 1, 15))
            .unwrap()
            .is_none());
        assert!(store
            .latest_row_before(&other, date(2024, 3, 15))
            .unwrap()
            .is_none());
    }

    pub fn list_rows_newest_first(store: &impl Store) {
        let user_id = UserId::generate();
        for start in [date(2024, 2, 15), date(2024, 1, 15), date(2024, 3, 15)] {
            store.create_row(&open_row(user_id, start)).unwrap();
        }
        store
            .create_row(&open_row(UserId::generate(), date(2024, 5, 15)))
            .unwrap();

        let rows = store.list_rows(&user_id).unwrap();
        let starts: Vec<_> = rows.iter().map(|r| r.period_start).collect();
        assert_eq!(
            starts,
            vec![date(2024, 3, 15), date(2024, 2, 15), date(2024, 1, 15)]
        );
        assert!(rows.iter().all(|r| r.updated_at <= Utc::now()));
    }

    pub fn run_all(store: &impl Store) {
        account_roundtrip(store);
        create_then_get(store);
        duplicate_create_is_rejected(store);
        update_checks_version(store);
        update_missing_row_is_not_found(store);
        latest_row_before_skips_current_and_other_users(store);
        list_rows_newest_first(store);
    }
}
