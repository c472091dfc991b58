//! In-memory storage implementation.
//!
//! Used by default in the service and in tests. State is lost on restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::NaiveDate;

use credit_ledger_core::{CreditLedgerRow, UserId};

use crate::error::{Result, StoreError};
use crate::{AccountProfile, Store};

/// Process-local storage backed by locked maps.
///
/// Rows are keyed by `(user_id, period_start)` in a `BTreeMap`, so a user's
/// rows are contiguous and ordered by period.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<UserId, AccountProfile>>,
    rows: RwLock<BTreeMap<(UserId, NaiveDate), CreditLedgerRow>>,
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Database("lock poisoned".to_string())
}

fn row_id(user_id: &UserId, period_start: NaiveDate) -> String {
    format!("{user_id}/{period_start}")
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn put_account(&self, account: &AccountProfile) -> Result<()> {
        self.accounts
            .write()
            .map_err(poisoned)?
            .insert(account.user_id, account.clone());
        Ok(())
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<AccountProfile>> {
        Ok(self.accounts.read().map_err(poisoned)?.get(user_id).cloned())
    }

    fn get_row(
        &self,
        user_id: &UserId,
        period_start: NaiveDate,
    ) -> Result<Option<CreditLedgerRow>> {
        Ok(self
            .rows
            .read()
            .map_err(poisoned)?
            .get(&(*user_id, period_start))
            .cloned())
    }

    fn create_row(&self, row: &CreditLedgerRow) -> Result<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let key = (row.user_id, row.period_start);
        if rows.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                entity: "ledger row",
                id: row_id(&row.user_id, row.period_start),
            });
        }
        rows.insert(key, row.clone());
        Ok(())
    }

    fn update_row(&self, row: &CreditLedgerRow, expected_version: u64) -> Result<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let stored = rows
            .get_mut(&(row.user_id, row.period_start))
            .ok_or_else(|| StoreError::NotFound {
                entity: "ledger row",
                id: row_id(&row.user_id, row.period_start),
            })?;

        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found: stored.version,
            });
        }

        *stored = row.clone();
        Ok(())
    }

    fn latest_row_before(
        &self,
        user_id: &UserId,
        period_start: NaiveDate,
    ) -> Result<Option<CreditLedgerRow>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows
            .range((*user_id, NaiveDate::MIN)..(*user_id, period_start))
            .next_back()
            .map(|(_, row)| row.clone()))
    }

    fn list_rows(&self, user_id: &UserId) -> Result<Vec<CreditLedgerRow>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows
            .range((*user_id, NaiveDate::MIN)..=(*user_id, NaiveDate::MAX))
            .rev()
            .map(|(_, row)| row.clone())
            .collect())
    }
}
