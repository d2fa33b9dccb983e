// Drives the real JoFotara client against a mock JoFotara API.
// Run with: cargo test --test jofotara_mock_server

mod support;

use std::time::Duration;

use axum::http::StatusCode;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};

use jofotara_connector::config::PayloadFormat;
use jofotara_connector::models::SubmissionStatus;
use jofotara_connector::services::JoFotaraClient;

use support::{device_config, oauth_config, sample_invoice, start_mock_jofotara, MOCK_TOKEN};

fn decode_invoice_body(body: &Value) -> String {
    let encoded = body["invoice"].as_str().expect("invoice field");
    String::from_utf8(general_purpose::STANDARD.decode(encoded).unwrap()).unwrap()
}

#[tokio::test]
async fn test_device_mode_json_submission() {
    let (base_url, state) = start_mock_jofotara().await;
    let client = JoFotaraClient::new(device_config(&base_url, PayloadFormat::Json)).unwrap();

    let result = client.submit(&sample_invoice("SINV-0001")).await;

    assert_eq!(result.status, SubmissionStatus::Success);
    assert_eq!(result.uuid.as_deref(), Some("abc-123"));
    assert_eq!(result.qr.as_deref(), Some("data:image/png;base64,AAA"));
    assert!(result.error_message.is_none());

    let state = state.read().await;
    assert_eq!(state.submit_calls, 1);
    assert_eq!(state.token_calls, 0);

    let headers = state.last_submit_headers.as_ref().unwrap();
    assert_eq!(headers["client-id"], "D1");
    assert_eq!(headers["secret-key"], "S1");
    assert_eq!(headers["activity-number"], "12345");
    assert_eq!(headers["key"], "12345");
    assert_eq!(headers["accept-language"], "ar");
    assert!(headers.get("authorization").is_none());

    let document: Value =
        serde_json::from_str(&decode_invoice_body(state.last_submit_body.as_ref().unwrap())).unwrap();
    assert_eq!(document["seller"]["taxId"], "SEL1");
    assert_eq!(document["buyer"]["taxId"], "BUY1");
    assert_eq!(document["payableAmount"], "73.000");
    assert_eq!(document["lines"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_device_mode_xml_submission() {
    let (base_url, state) = start_mock_jofotara().await;
    let client = JoFotaraClient::new(device_config(&base_url, PayloadFormat::Xml)).unwrap();

    let result = client.submit(&sample_invoice("SINV-0002")).await;
    assert_eq!(result.status, SubmissionStatus::Success);

    let state = state.read().await;
    let document = decode_invoice_body(state.last_submit_body.as_ref().unwrap());
    assert!(document.starts_with("<?xml"));
    assert!(document.contains("<cbc:ID>SINV-0002</cbc:ID>"));
    assert!(document.contains("BUY1"));
    assert!(!document.contains("\n<"));
}

#[tokio::test]
async fn test_oauth_token_rejected_skips_submit() {
    let (base_url, state) = start_mock_jofotara().await;
    state.write().await.token_status = StatusCode::UNAUTHORIZED;

    let client = JoFotaraClient::new(oauth_config(&base_url)).unwrap();
    let result = client.submit(&sample_invoice("SINV-0003")).await;

    assert_eq!(result.status, SubmissionStatus::Failed);
    assert!(result.error_message.unwrap().starts_with("Authentication failed"));

    let state = state.read().await;
    assert_eq!(state.token_calls, 1);
    assert_eq!(state.submit_calls, 0);
}

#[tokio::test]
async fn test_oauth_token_is_cached() {
    let (base_url, state) = start_mock_jofotara().await;
    let client = JoFotaraClient::new(oauth_config(&base_url)).unwrap();

    for name in ["SINV-0004", "SINV-0005"] {
        let result = client.submit(&sample_invoice(name)).await;
        assert_eq!(result.status, SubmissionStatus::Success);
    }

    let state = state.read().await;
    assert_eq!(state.token_calls, 1);
    assert_eq!(state.submit_calls, 2);

    let form = state.last_token_form.as_ref().unwrap();
    assert_eq!(form["grant_type"], "client_credentials");
    assert_eq!(form["client_id"], "client-1");

    let headers = state.last_submit_headers.as_ref().unwrap();
    assert_eq!(headers["authorization"], format!("Bearer {}", MOCK_TOKEN).as_str());
}

#[tokio::test]
async fn test_unauthorized_submit_drops_cached_token() {
    let (base_url, state) = start_mock_jofotara().await;
    let client = JoFotaraClient::new(oauth_config(&base_url)).unwrap();

    state.write().await.submit_response =
        (StatusCode::UNAUTHORIZED, json!({ "message": "token expired" }).to_string());
    let first = client.submit(&sample_invoice("SINV-0006")).await;
    assert_eq!(first.status, SubmissionStatus::Failed);

    state.write().await.submit_response = (StatusCode::OK, json!({ "uuid": "u-2" }).to_string());
    let second = client.submit(&sample_invoice("SINV-0006")).await;
    assert_eq!(second.status, SubmissionStatus::Success);

    assert_eq!(state.read().await.token_calls, 2);
}

#[tokio::test]
async fn test_token_timeout_reports_failure() {
    let (base_url, state) = start_mock_jofotara().await;
    state.write().await.token_delay = Some(Duration::from_secs(3));

    let mut config = oauth_config(&base_url);
    config.request_timeout_secs = 1;
    let client = JoFotaraClient::new(config).unwrap();

    let result = client.submit(&sample_invoice("SINV-0007")).await;

    assert_eq!(result.status, SubmissionStatus::Failed);
    assert!(result.error_message.unwrap().contains("timed out"));
    assert_eq!(state.read().await.submit_calls, 0);
}

#[tokio::test]
async fn test_http_error_is_echoed() {
    let (base_url, state) = start_mock_jofotara().await;
    state.write().await.submit_response = (
        StatusCode::BAD_REQUEST,
        json!({ "EINV_RESULTS": { "ERRORS": [{ "EINV_MESSAGE": "invalid buyer" }] } }).to_string(),
    );

    let client = JoFotaraClient::new(device_config(&base_url, PayloadFormat::Xml)).unwrap();
    let result = client.submit(&sample_invoice("SINV-0008")).await;

    assert_eq!(result.status, SubmissionStatus::Failed);
    let message = result.error_message.unwrap();
    assert!(message.starts_with("JoFotara HTTP 400"));
    assert!(message.contains("invalid buyer"));
    assert!(result.raw_response.is_some());
}

#[tokio::test]
async fn test_success_without_identifiers() {
    let (base_url, state) = start_mock_jofotara().await;
    state.write().await.submit_response = (StatusCode::OK, "{}".to_string());

    let client = JoFotaraClient::new(device_config(&base_url, PayloadFormat::Json)).unwrap();
    let result = client.submit(&sample_invoice("SINV-0009")).await;

    assert_eq!(result.status, SubmissionStatus::Success);
    assert!(result.uuid.is_none());
    assert!(result.qr.is_none());
}

#[tokio::test]
async fn test_invoice_without_items_never_reaches_network() {
    let (base_url, state) = start_mock_jofotara().await;
    let client = JoFotaraClient::new(device_config(&base_url, PayloadFormat::Xml)).unwrap();

    let mut invoice = sample_invoice("SINV-0010");
    invoice.items.clear();
    let result = client.submit(&invoice).await;

    assert_eq!(result.status, SubmissionStatus::Failed);
    assert!(result.error_message.unwrap().contains("line items"));
    assert_eq!(state.read().await.submit_calls, 0);
}

#[tokio::test]
async fn test_cancel_and_query() {
    let (base_url, state) = start_mock_jofotara().await;
    state.write().await.status_response = (
        StatusCode::OK,
        json!({ "EINV_STATUS": "PENDING", "EINV_INV_UUID": "abc-123" }).to_string(),
    );
    let client = JoFotaraClient::new(device_config(&base_url, PayloadFormat::Json)).unwrap();

    let cancelled = client.cancel("abc-123").await;
    assert_eq!(cancelled.status, SubmissionStatus::Success);

    let queried = client.query("abc-123").await;
    assert_eq!(queried.status, SubmissionStatus::Pending);
    assert_eq!(queried.uuid.as_deref(), Some("abc-123"));

    let state = state.read().await;
    assert_eq!(state.last_cancel_body.as_ref().unwrap()["uuid"], "abc-123");
    assert_eq!(state.last_status_uuid.as_deref(), Some("abc-123"));
}
