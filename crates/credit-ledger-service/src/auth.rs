//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `ServiceAuth` - Service-to-service authentication via API key
//! - `AdminAuth` - Admin authentication for privileged endpoints

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::state::AppState;

/// Read a header as a string.
fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Service authentication via API key.
///
/// Used by the product services that meter usage.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name or identifier.
    pub service_name: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Check for X-API-Key header
        let api_key = header(parts, "x-api-key").ok_or(ApiError::Unauthorized)?;

        // Validate against configured service API key
        let expected_key = state
            .config
            .service_api_key
            .as_ref()
            .ok_or(ApiError::Unauthorized)?;

        if api_key != expected_key {
            return Err(ApiError::Unauthorized);
        }

        let service_name = header(parts, "x-service-name")
            .unwrap_or("unknown")
            .to_string();

        Ok(Self { service_name })
    }
}

/// Admin authentication via API key with admin scope.
///
/// Used for crediting purchased credits. Requires the `X-Admin-Key` header
/// to match the configured admin key.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let admin_key = header(parts, "x-admin-key").ok_or(ApiError::Unauthorized)?;

        let expected_key = state
            .config
            .admin_api_key
            .as_ref()
            .ok_or(ApiError::Unauthorized)?;

        if admin_key != expected_key {
            return Err(ApiError::Unauthorized);
        }

        let admin_id = header(parts, "x-admin-id").unwrap_or("admin").to_string();

        tracing::info!(admin_id = %admin_id, "Admin authenticated");

        Ok(Self { admin_id })
    }
}
