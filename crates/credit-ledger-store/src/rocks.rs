//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Values are CBOR-encoded. Row writes that must observe the current version
//! are serialized through a process-wide lock, which is sufficient because a
//! `RocksDB` directory is owned by a single process.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options,
};

use credit_ledger_core::{CreditLedgerRow, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AccountProfile, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn put_row(&self, row: &CreditLedgerRow) -> Result<()> {
        let cf = self.cf(cf::LEDGER_ROWS)?;
        let key = keys::row_key(&row.user_id, row.period_start);
        let value = Self::serialize(row)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn put_account(&self, account: &AccountProfile) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.user_id);
        let value = Self::serialize(account)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<AccountProfile>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    // =========================================================================
    // Ledger Row Operations
    // =========================================================================

    fn get_row(
        &self,
        user_id: &UserId,
        period_start: NaiveDate,
    ) -> Result<Option<CreditLedgerRow>> {
        let cf = self.cf(cf::LEDGER_ROWS)?;
        let key = keys::row_key(user_id, period_start);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn create_row(&self, row: &CreditLedgerRow) -> Result<()> {
        let _guard = self.lock()?;

        if self.get_row(&row.user_id, row.period_start)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "ledger row",
                id: format!("{}/{}", row.user_id, row.period_start),
            });
        }

        self.put_row(row)
    }

    fn update_row(&self, row: &CreditLedgerRow, expected_version: u64) -> Result<()> {
        let _guard = self.lock()?;

        let stored = self
            .get_row(&row.user_id, row.period_start)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "ledger row",
                id: format!("{}/{}", row.user_id, row.period_start),
            })?;

        if stored.version != expected_version {
            tracing::debug!(
                user_id = %row.user_id,
                period_start = %row.period_start,
                expected = expected_version,
                found = stored.version,
                "Ledger row version conflict"
            );
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found: stored.version,
            });
        }

        self.put_row(row)
    }

    fn latest_row_before(
        &self,
        user_id: &UserId,
        period_start: NaiveDate,
    ) -> Result<Option<CreditLedgerRow>> {
        let cf = self.cf(cf::LEDGER_ROWS)?;
        let prefix = keys::user_rows_prefix(user_id);
        let upper = keys::row_key(user_id, period_start);

        // Reverse iteration starts at the last key <= `upper`.
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&upper, Direction::Reverse));

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }
            if key.as_ref() == upper.as_slice() {
                continue;
            }

            return Self::deserialize(&value).map(Some);
        }

        Ok(None)
    }

    fn list_rows(&self, user_id: &UserId) -> Result<Vec<CreditLedgerRow>> {
        let cf = self.cf(cf::LEDGER_ROWS)?;
        let prefix = keys::user_rows_prefix(user_id);

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            rows.push(Self::deserialize(&value)?);
        }

        // Keys are ordered oldest first.
        rows.reverse();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use credit_ledger_core::{PeriodSeed, SubscriptionTier};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn rocks_store_conformance() {
        let (store, _dir) = create_test_store();
        conformance::run_all(&store);
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let user_id = UserId::generate();
        let start = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        {
            let store = RocksStore::open(dir.path()).unwrap();
            let row = CreditLedgerRow::open(
                user_id,
                start,
                PeriodSeed::from_previous(SubscriptionTier::Team, None),
            );
            store.create_row(&row).unwrap();
            store
                .put_account(&AccountProfile::new(user_id, SubscriptionTier::Team, start))
                .unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        let row = store.get_row(&user_id, start).unwrap().unwrap();
        assert_eq!(row.subscription_granted, 2500.0);
        assert_eq!(
            store.get_account(&user_id).unwrap().unwrap().tier,
            SubscriptionTier::Team
        );
    }
}
