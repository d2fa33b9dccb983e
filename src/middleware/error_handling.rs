// ============================================================================
// Error Handling - JSON error responses
// ============================================================================
//
// Every handler error renders as `{"error": <message>, "status": <code>}`.
//
// Remote JoFotara failures are NOT errors at this layer: they travel as a
// `SubmissionResult` with status `Failed` inside a 200 response.
//
// ============================================================================

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::services::InvoiceServiceError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] JsonRejection),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),
}

impl From<InvoiceServiceError> for AppError {
    fn from(err: InvoiceServiceError) -> Self {
        match err {
            InvoiceServiceError::NotFound(name) => {
                AppError::NotFound(format!("Invoice {} not found", name))
            }
            InvoiceServiceError::MissingQr(_) => AppError::BadRequest(err.to_string()),
            InvoiceServiceError::QrImage(e) => AppError::Unprocessable(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(ref errors) => {
                tracing::debug!("Validation failed: {}", errors);
                (StatusCode::BAD_REQUEST, format!("Validation failed: {}", errors))
            }
            AppError::Json(ref rejection) => {
                tracing::debug!("Rejected JSON body: {}", rejection);
                (rejection.status(), "Invalid JSON".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
