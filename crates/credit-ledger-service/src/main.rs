//! Credit Ledger Service - HTTP API for metered AI credits
//!
//! This is the main entry point for the credit ledger service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credit_ledger_service::{create_router, AppState, ServiceConfig};
use credit_ledger_store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,credit_ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Credit Ledger Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        priced_models = config.pricing.len(),
        margin_multiplier = config.conversion.margin_multiplier,
        credit_value_usd = config.conversion.credit_value_usd,
        max_update_retries = config.max_update_retries,
        "Service configuration loaded"
    );

    let store = open_store(&config)?;

    // Build app state
    let state = AppState::new(store, config.clone());

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    Ok(Arc::new(credit_ledger_store::RocksStore::open(
        &config.data_dir,
    )?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_store(_config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::warn!("Built without rocksdb-backend - ledger state is kept in memory only");
    Ok(Arc::new(credit_ledger_store::MemoryStore::new()))
}
