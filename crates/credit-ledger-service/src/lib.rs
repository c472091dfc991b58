//! Credit Ledger HTTP API Service.
//!
//! This crate exposes the credit ledger over HTTP:
//!
//! - Account registration (tier and billing anchor)
//! - Balance, credit checks and per-period usage
//! - Usage reporting and cost estimates
//! - Crediting purchased credits (admin)
//!
//! # Authentication
//!
//! 1. **Service API key** (`x-api-key`) - for the product services that
//!    meter usage
//! 2. **Admin API key** (`x-admin-key`) - for crediting purchases

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for Axum even when the store is not

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metering;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use metering::{Metering, MeteringError, UsageReceipt};
pub use routes::create_router;
pub use state::AppState;
