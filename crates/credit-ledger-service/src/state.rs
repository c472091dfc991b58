//! Application state.

use std::sync::Arc;

use credit_ledger_core::CostCalculator;
use credit_ledger_store::Store;

use crate::config::ServiceConfig;
use crate::metering::Metering;

/// Application state shared across handlers.
pub struct AppState {
    /// Ledger operations over the store.
    pub metering: Metering<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not set - service endpoints will reject all requests");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set - purchased credits cannot be added");
        }

        let calculator = CostCalculator::new(config.pricing.clone(), config.conversion);
        let metering = Metering::new(store, calculator, config.max_update_retries);

        Self {
            metering,
            config,
        }
    }
}
