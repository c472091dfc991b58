//! Usage reporting integration tests.

mod common;

use axum::http::StatusCode;
use common::{assert_close, TestHarness};
use serde_json::{json, Value};

fn text_event(input_tokens: u64) -> Value {
    json!({
        "model": "assess",
        "payload": {
            "modality": "text",
            "tokens": { "input": input_tokens }
        },
        "elapsed_seconds": 2.0
    })
}

fn replicate_event(units: u64) -> Value {
    json!({
        "model": "replicate",
        "payload": { "modality": "flat_rate", "units": units }
    })
}

async fn report(harness: &TestHarness, event: Value) -> axum_test::TestResponse {
    harness
        .service_post("/v1/usage")
        .add_header(
            axum::http::HeaderName::from_static("x-service-name"),
            common::header_value("voice-agent"),
        )
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "event": event
        }))
        .await
}

// ============================================================================
// Report Usage
// ============================================================================

#[tokio::test]
async fn report_text_usage_on_free_tier() {
    let harness = TestHarness::new();
    harness.register("free").await;

    // 1000 tokens at $10/1M = $0.01 = 0.3 credits.
    let response = report(&harness, text_event(1000)).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_close(&body["cost_usd"], 0.01);
    assert_close(&body["credits"], 0.3);
    assert_close(&body["deduction"]["from_subscription"], 0.3);
    assert_close(&body["deduction"]["from_purchased"], 0.0);
    assert_close(&body["balance"]["total_remaining"], 74.7);
}

#[tokio::test]
async fn usage_is_aggregated_per_model() {
    let harness = TestHarness::new();
    harness.register("pro").await;

    report(&harness, text_event(1000)).await.assert_status_ok();
    report(&harness, text_event(3000)).await.assert_status_ok();
    report(&harness, replicate_event(1)).await.assert_status_ok();
    report(&harness, replicate_event(2)).await.assert_status_ok();

    let response = harness
        .service_get(&format!("/v1/accounts/{}/usage", harness.test_user_id))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["version"], 4);
    // $0.04 + $0.06 at 30 credits per dollar
    assert_close(&body["credits_charged"], 3.0);

    let usage = body["usage"].as_array().unwrap();
    assert_eq!(usage.len(), 2);

    let text = usage
        .iter()
        .find(|r| r["key"]["kind"] == "text")
        .unwrap();
    assert_eq!(text["key"]["model"], "assess");
    assert_eq!(text["aggregate"]["request_count"], 2);
    assert_eq!(text["aggregate"]["text"]["input"], 4000);
    assert_close(&text["aggregate"]["total_cost_usd"], 0.04);
    assert_close(&text["aggregate"]["mean_elapsed_seconds"], 2.0);

    let flat = usage
        .iter()
        .find(|r| r["key"]["kind"] == "flat_rate")
        .unwrap();
    assert_eq!(flat["aggregate"]["request_count"], 2);
    assert_eq!(flat["aggregate"]["unit_count"], 3);
    assert_close(&flat["aggregate"]["total_cost_usd"], 0.06);
}

#[tokio::test]
async fn subscription_is_spent_before_purchased() {
    let harness = TestHarness::new();
    harness.register("free").await;
    harness.add_purchased(10.0).await;

    // 120 units at $0.02 = $2.40 = 72 credits, all from the subscription bucket.
    report(&harness, replicate_event(120)).await.assert_status_ok();

    // 10 units = 6 credits: 3 from subscription, 3 from purchased.
    let response = report(&harness, replicate_event(10)).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_close(&body["deduction"]["from_subscription"], 3.0);
    assert_close(&body["deduction"]["from_purchased"], 3.0);
    assert_close(&body["balance"]["subscription"]["remaining"], 0.0);
    assert_close(&body["balance"]["purchased"]["remaining"], 7.0);
}

#[tokio::test]
async fn insufficient_credits_returns_402_and_charges_nothing() {
    let harness = TestHarness::new();
    harness.register("free").await;

    // 200 units = 120 credits > 75 available.
    let response = report(&harness, replicate_event(200)).await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_credits");
    assert_close(&body["error"]["details"]["available"], 75.0);
    assert_close(&body["error"]["details"]["required"], 120.0);

    let usage: Value = harness
        .service_get(&format!("/v1/accounts/{}/usage", harness.test_user_id))
        .await
        .json();
    assert_eq!(usage["version"], 0);
    assert_eq!(usage["usage"], json!([]));
    assert_close(&usage["balance"]["total_used"], 0.0);
}

#[tokio::test]
async fn unpriced_model_is_internal_error() {
    let harness = TestHarness::new();
    harness.register("pro").await;

    let response = report(
        &harness,
        json!({
            "model": "mystery-model",
            "payload": { "modality": "text", "tokens": { "input": 10 } }
        }),
    )
    .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "internal_error");
    assert_close(&harness.balance().await["total_used"], 0.0);
}

#[tokio::test]
async fn report_for_unknown_account_is_not_found() {
    let harness = TestHarness::new();

    report(&harness, text_event(1000))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn report_requires_service_key() {
    let harness = TestHarness::new();
    harness.register("pro").await;

    harness
        .server
        .post("/v1/usage")
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "event": text_event(1000)
        }))
        .expect_failure()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    assert_close(&harness.balance().await["total_used"], 0.0);
}

// ============================================================================
// Estimate
// ============================================================================

#[tokio::test]
async fn estimate_prices_without_charging() {
    let harness = TestHarness::new();
    harness.register("free").await;

    let response = harness
        .service_post("/v1/usage/estimate")
        .json(&replicate_event(3))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["model"], "replicate");
    assert_eq!(body["modality"], "flat_rate");
    assert_close(&body["cost_usd"], 0.06);
    assert_close(&body["credits"], 1.8);

    assert_close(&harness.balance().await["total_used"], 0.0);
}

#[tokio::test]
async fn estimate_needs_no_account() {
    let harness = TestHarness::new();

    harness
        .service_post("/v1/usage/estimate")
        .json(&text_event(1000))
        .await
        .assert_status_ok();
}
