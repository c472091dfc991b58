//! Column families used by the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Account profiles, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger rows, keyed by `user_id || period_start`.
    ///
    /// Keys sort chronologically within a user, so a reverse scan from a
    /// period start yields the previous period.
    pub const LEDGER_ROWS: &str = "ledger_rows";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::ACCOUNTS, cf::LEDGER_ROWS]
}
