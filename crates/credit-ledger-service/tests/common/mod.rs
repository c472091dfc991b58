//! Common test utilities for credit ledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::{TestRequest, TestServer};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};

use credit_ledger_core::{
    CreditConversion, Modality, PriceSpec, PricingTable, TokenRates, UserId,
};
use credit_ledger_service::{create_router, AppState, ServiceConfig};
use credit_ledger_store::MemoryStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// A test user ID.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// The admin API key for privileged requests.
    pub admin_api_key: String,
}

/// Prices used by the integration tests.
///
/// - `assess`: $10 per 1M tokens on every channel, so 1000 tokens = $0.01
/// - `replicate`: $0.02 per generation
pub fn test_pricing() -> PricingTable {
    PricingTable::empty()
        .with_price(
            "assess",
            Modality::Text,
            PriceSpec::Tokens(TokenRates::new(10.0, 10.0, 10.0)),
        )
        .with_price(
            "replicate",
            Modality::FlatRate,
            PriceSpec::PerGeneration {
                cost_per_generation: 0.02,
            },
        )
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: String::new(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            max_update_retries: 5,
            pricing: test_pricing(),
            conversion: CreditConversion::default(),
        };

        let state = AppState::new(Arc::new(MemoryStore::new()), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            test_user_id,
            service_api_key,
            admin_api_key,
        }
    }

    /// A GET request authenticated with the service API key.
    pub fn service_get(&self, path: &str) -> TestRequest {
        self.server
            .get(path)
            .add_header(api_key_header(), header_value(&self.service_api_key))
    }

    /// A POST request authenticated with the service API key.
    pub fn service_post(&self, path: &str) -> TestRequest {
        self.server
            .post(path)
            .add_header(api_key_header(), header_value(&self.service_api_key))
    }

    /// A POST request authenticated with the admin API key.
    pub fn admin_post(&self, path: &str) -> TestRequest {
        self.server
            .post(path)
            .add_header(admin_key_header(), header_value(&self.admin_api_key))
    }

    /// Today's date, the day the service bills against.
    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Register the test user on `tier`, anchored today.
    pub async fn register(&self, tier: &str) -> Value {
        let response = self
            .service_post("/v1/accounts")
            .json(&json!({
                "user_id": self.test_user_id.to_string(),
                "tier": tier,
            }))
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Add purchased credits to the test user.
    pub async fn add_purchased(&self, credits: f64) {
        self.admin_post("/v1/credits/purchased")
            .json(&json!({
                "user_id": self.test_user_id.to_string(),
                "credits": credits,
                "reason": "test purchase"
            }))
            .await
            .assert_status_ok();
    }

    /// Current balance JSON of the test user.
    pub async fn balance(&self) -> Value {
        let response = self
            .service_get(&format!("/v1/accounts/{}/balance", self.test_user_id))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["balance"].clone()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// The service API key header name.
pub fn api_key_header() -> HeaderName {
    HeaderName::from_static("x-api-key")
}

/// The admin API key header name.
pub fn admin_key_header() -> HeaderName {
    HeaderName::from_static("x-admin-key")
}

/// A header value from a test string.
pub fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).expect("valid header value")
}

/// Compare two JSON numbers with a float tolerance.
pub fn assert_close(actual: &Value, expected: f64) {
    let actual = actual.as_f64().expect("expected a number");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
