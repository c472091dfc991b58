//! Service configuration.

use std::path::Path;

use credit_ledger_core::{
    CreditConversion, PricingTable, DEFAULT_CREDIT_VALUE_USD, DEFAULT_MARGIN_MULTIPLIER,
};

/// Default number of attempts for a ledger read-modify-write.
pub const DEFAULT_MAX_UPDATE_RETRIES: u32 = 5;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/credit-ledger").
    pub data_dir: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Admin API key for crediting purchases.
    pub admin_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Attempts for a ledger update before giving up on version conflicts.
    pub max_update_retries: u32,

    /// Model prices.
    pub pricing: PricingTable,

    /// USD to credit conversion.
    pub conversion: CreditConversion,
}

impl ServiceConfig {
    /// Load configuration from environment variables and the pricing file.
    #[must_use]
    pub fn from_env() -> Self {
        let pricing = std::env::var("PRICING_FILE")
            .ok()
            .map_or_else(PricingTable::default, |path| load_pricing(&path));

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/credit-ledger".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            max_update_retries: std::env::var("MAX_UPDATE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_UPDATE_RETRIES),
            pricing,
            conversion: CreditConversion {
                margin_multiplier: positive_env("MARGIN_MULTIPLIER")
                    .unwrap_or(DEFAULT_MARGIN_MULTIPLIER),
                credit_value_usd: positive_env("CREDIT_VALUE_USD")
                    .unwrap_or(DEFAULT_CREDIT_VALUE_USD),
            },
        }
    }
}

/// Parse a strictly positive, finite float from the environment.
fn positive_env(name: &str) -> Option<f64> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Load a pricing table from a JSON file, falling back to the built-in rates.
#[must_use]
pub fn load_pricing(path: &str) -> PricingTable {
    match load_json_file::<PricingTable>(path) {
        Ok(table) => {
            tracing::info!(path = %path, models = table.len(), "Loaded pricing table from file");
            table
        }
        Err(e) => {
            tracing::error!(
                path = %path,
                error = %e,
                "Failed to load pricing file, using built-in rates"
            );
            PricingTable::default()
        }
    }
}

/// Load a value from a JSON file.
fn load_json_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/credit-ledger".into(),
            service_api_key: None,
            admin_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            max_update_retries: DEFAULT_MAX_UPDATE_RETRIES,
            pricing: PricingTable::default(),
            conversion: CreditConversion::default(),
        }
    }
}
