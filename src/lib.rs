pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::ConnectorConfig;
use crate::services::{InMemoryInvoiceStore, InvoiceStore, InvoiceSubmissionService, JoFotaraClient, JoFotaraError};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub invoices: Arc<InvoiceSubmissionService>,
}

impl AppState {
    pub fn new(invoices: InvoiceSubmissionService) -> Self {
        Self {
            invoices: Arc::new(invoices),
        }
    }

    /// Client plus in-memory store built from connector settings.
    pub fn from_connector_config(config: ConnectorConfig) -> Result<Self, JoFotaraError> {
        let client = Arc::new(JoFotaraClient::new(config)?);
        let store: Arc<dyn InvoiceStore> = Arc::new(InMemoryInvoiceStore::new());
        Ok(Self::new(InvoiceSubmissionService::new(client, store)))
    }
}

/// Routes, request-id tagging, metrics and tracing. CORS is added by the
/// binary since it depends on deployment settings.
pub fn create_app(state: AppState) -> Router {
    use crate::handlers::{health, invoices};

    Router::new()
        .route("/api/health", get(health::health_check))
        .nest(
            "/api/invoices",
            Router::new()
                .route("/on-submit", post(invoices::on_submit))
                .route("/:name", get(invoices::get_invoice_fields))
                .route("/:name/send", post(invoices::send_now))
                .route("/:name/cancel", post(invoices::cancel_invoice))
                .route("/:name/status", get(invoices::refresh_status))
                .route("/:name/qr-image", post(invoices::attach_qr_image)),
        )
        .route("/api/jofotara/last-response", get(invoices::last_response))
        .route("/metrics", get(middleware::metrics::metrics_handler))
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::metrics::metrics_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
}
