use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::{
    middleware::error_handling::Result,
    models::{Invoice, JoFotaraFields, SubmissionResult},
    utils::log_sanitizer::sanitize_for_log,
    AppState,
};

#[derive(Debug, Serialize)]
pub struct OnSubmitResponse {
    pub invoice: String,
    /// False when auto-send is off and the invoice was only stored
    pub sent: bool,
    pub result: Option<SubmissionResult>,
    pub fields: JoFotaraFields,
}

#[derive(Debug, Serialize)]
pub struct QrImageResponse {
    pub invoice: String,
    pub jofotara_qr_image: String,
}

#[derive(Debug, Serialize)]
pub struct LastResponsePreview {
    pub last_response: Option<String>,
    pub last_xml: Option<String>,
}

/// POST /api/invoices/on-submit - ERP submit hook
///
/// JoFotara failures are reported in the body with a 200; only a malformed
/// invoice is rejected.
pub async fn on_submit(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Invoice>, JsonRejection>,
) -> Result<Json<OnSubmitResponse>> {
    let Json(invoice) = payload?;
    invoice.validate()?;

    let name = invoice.name.clone();
    tracing::info!("on_submit received for {}", sanitize_for_log(&name));

    let result = state.invoices.on_submit(invoice).await;
    let fields = state.invoices.fields(&name).unwrap_or_default();

    Ok(Json(OnSubmitResponse {
        invoice: name,
        sent: result.is_some(),
        result,
        fields,
    }))
}

/// POST /api/invoices/:name/send - manual "send now"
pub async fn send_now(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SubmissionResult>> {
    let result = state.invoices.send_now(&name).await?;
    Ok(Json(result))
}

/// POST /api/invoices/:name/cancel
pub async fn cancel_invoice(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SubmissionResult>> {
    let result = state.invoices.cancel(&name).await?;
    Ok(Json(result))
}

/// GET /api/invoices/:name/status
pub async fn refresh_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SubmissionResult>> {
    let result = state.invoices.refresh_status(&name).await?;
    Ok(Json(result))
}

/// POST /api/invoices/:name/qr-image
pub async fn attach_qr_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<QrImageResponse>> {
    let image = state.invoices.attach_qr_image(&name).await?;
    Ok(Json(QrImageResponse {
        invoice: name,
        jofotara_qr_image: image,
    }))
}

/// GET /api/invoices/:name - the JoFotara fields recorded on the invoice
pub async fn get_invoice_fields(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<JoFotaraFields>> {
    Ok(Json(state.invoices.fields(&name)?))
}

/// GET /api/jofotara/last-response - last raw reply and submitted document
pub async fn last_response(State(state): State<AppState>) -> Json<LastResponsePreview> {
    Json(LastResponsePreview {
        last_response: state.invoices.last_response().await,
        last_xml: state.invoices.last_xml().await,
    })
}
