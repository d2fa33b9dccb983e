// Mock JoFotara API for integration tests
// Token, submit, cancel and status endpoints on an ephemeral port, with
// shared state the tests can script and inspect.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use jofotara_connector::config::{ConnectorConfig, PayloadFormat};
use jofotara_connector::models::Invoice;

pub const MOCK_TOKEN: &str = "mock-jofotara-token";

#[derive(Debug)]
pub struct MockJoFotaraState {
    pub token_status: StatusCode,
    pub token_delay: Option<Duration>,
    pub token_calls: usize,
    pub last_token_form: Option<HashMap<String, String>>,

    pub submit_response: (StatusCode, String),
    pub submit_calls: usize,
    pub last_submit_body: Option<Value>,
    pub last_submit_headers: Option<HeaderMap>,

    pub cancel_response: (StatusCode, String),
    pub last_cancel_body: Option<Value>,

    pub status_response: (StatusCode, String),
    pub last_status_uuid: Option<String>,
}

impl Default for MockJoFotaraState {
    fn default() -> Self {
        Self {
            token_status: StatusCode::OK,
            token_delay: None,
            token_calls: 0,
            last_token_form: None,
            submit_response: (
                StatusCode::OK,
                json!({ "uuid": "abc-123", "qr": "data:image/png;base64,AAA" }).to_string(),
            ),
            submit_calls: 0,
            last_submit_body: None,
            last_submit_headers: None,
            cancel_response: (StatusCode::OK, json!({ "status": "CANCELLED" }).to_string()),
            last_cancel_body: None,
            status_response: (
                StatusCode::OK,
                json!({ "EINV_STATUS": "SUBMITTED", "EINV_INV_UUID": "abc-123", "EINV_QR": "QR-PAYLOAD" })
                    .to_string(),
            ),
            last_status_uuid: None,
        }
    }
}

pub type SharedState = Arc<RwLock<MockJoFotaraState>>;

async fn token(
    State(state): State<SharedState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let delay = {
        let mut state = state.write().await;
        state.token_calls += 1;
        state.last_token_form = Some(form);
        state.token_delay
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let status = state.read().await.token_status;
    if !status.is_success() {
        return (status, Json(json!({ "error": "invalid_client" }))).into_response();
    }

    Json(json!({
        "access_token": MOCK_TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600
    }))
    .into_response()
}

async fn submit(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.write().await;
    state.submit_calls += 1;
    state.last_submit_body = Some(body);
    state.last_submit_headers = Some(headers);

    let (status, body) = state.submit_response.clone();
    (status, body).into_response()
}

async fn cancel(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    let mut state = state.write().await;
    state.last_cancel_body = Some(body);

    let (status, body) = state.cancel_response.clone();
    (status, body).into_response()
}

async fn invoice_status(State(state): State<SharedState>, Path(uuid): Path<String>) -> Response {
    let mut state = state.write().await;
    state.last_status_uuid = Some(uuid);

    let (status, body) = state.status_response.clone();
    (status, body).into_response()
}

pub fn create_mock_jofotara_server(state: SharedState) -> Router {
    Router::new()
        .route("/oauth/token", post(token))
        .route("/core/invoices/", post(submit))
        .route("/core/invoices/cancel", post(cancel))
        .route("/core/invoices/status/:uuid", get(invoice_status))
        .with_state(state)
}

pub async fn start_mock_jofotara() -> (String, SharedState) {
    let state: SharedState = Arc::new(RwLock::new(MockJoFotaraState::default()));
    let app = create_mock_jofotara_server(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn with_endpoints(mut config: ConnectorConfig, base_url: &str) -> ConnectorConfig {
    config.base_url = base_url.to_string();
    config.submit_url = "/core/invoices/".to_string();
    config.cancel_url = Some("/core/invoices/cancel".to_string());
    config.query_url = Some("/core/invoices/status/".to_string());
    config.seller_tax_number = Some("SEL1".to_string());
    config
}

pub fn device_config(base_url: &str, format: PayloadFormat) -> ConnectorConfig {
    let mut config = with_endpoints(ConnectorConfig::device("D1", "S1", "AC-12345"), base_url);
    config.payload_format = format;
    config
}

pub fn oauth_config(base_url: &str) -> ConnectorConfig {
    with_endpoints(
        ConnectorConfig::oauth2("/oauth/token", "client-1", "secret-1", "12345"),
        base_url,
    )
}

/// Two-line invoice: 2 x 25.5 less 1 at the default 16% VAT, plus 1.5 hours
/// at 10 with 0% VAT.
pub fn sample_invoice(name: &str) -> Invoice {
    serde_json::from_value(json!({
        "name": name,
        "posting_date": "2025-03-14",
        "currency": "JOD",
        "seller": { "tax_id": "SEL1", "name": "Seller Co" },
        "buyer": { "tax_id": "BUY1", "name": "Buyer LLC" },
        "items": [
            { "item_name": "Widget", "qty": "2", "uom": "Nos", "rate": "25.5", "discount_amount": "1" },
            { "item_code": "SVC-1", "qty": "1.5", "uom": "Hour", "rate": "10", "vat_rate": "0" }
        ],
        "grand_total": "73"
    }))
    .unwrap()
}
