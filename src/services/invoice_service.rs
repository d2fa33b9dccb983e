// Invoice submission workflow
// The ERP-facing side of the connector: keeps invoice snapshots, drives the
// JoFotara client and writes results back onto the invoice record.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{Invoice, JoFotaraFields, SubmissionResult, SubmissionStatus};
use crate::services::jofotara::qr::{render_png_data_uri, QrImageError};
use crate::services::jofotara::response::truncate;
use crate::services::jofotara::JoFotaraClient;
use crate::utils::log_sanitizer::{sanitize_for_log, sanitize_option_for_log};

/// Longest preview returned by [`InvoiceSubmissionService::last_response`].
pub const LAST_RESPONSE_PREVIEW: usize = 1400;

/// Longest document kept by [`InvoiceSubmissionService::last_xml`].
pub const LAST_XML_PREVIEW: usize = 100_000;

/// Recorded on the invoice after a successful cancellation.
pub const STATUS_CANCELLED: &str = "Cancelled";

#[derive(Error, Debug)]
pub enum InvoiceServiceError {
    #[error("Invoice not found: {0}")]
    NotFound(String),

    #[error("Invoice {0} has no JoFotara QR payload")]
    MissingQr(String),

    #[error(transparent)]
    QrImage(#[from] QrImageError),
}

pub type Result<T> = std::result::Result<T, InvoiceServiceError>;

/// Where invoice snapshots and their JoFotara fields live.
pub trait InvoiceStore: Send + Sync {
    fn save_invoice(&self, invoice: Invoice);
    fn invoice(&self, name: &str) -> Option<Invoice>;
    fn fields(&self, name: &str) -> Option<JoFotaraFields>;
    fn update_fields(&self, name: &str, fields: JoFotaraFields);
}

#[derive(Debug, Clone)]
struct StoredInvoice {
    invoice: Invoice,
    fields: JoFotaraFields,
}

#[derive(Debug, Default)]
pub struct InMemoryInvoiceStore {
    invoices: DashMap<String, StoredInvoice>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InvoiceStore for InMemoryInvoiceStore {
    fn save_invoice(&self, invoice: Invoice) {
        // Re-delivering a snapshot keeps what JoFotara already told us.
        let name = invoice.name.clone();
        match self.invoices.get_mut(&name) {
            Some(mut stored) => stored.invoice = invoice,
            None => {
                self.invoices.insert(
                    name,
                    StoredInvoice {
                        invoice,
                        fields: JoFotaraFields::default(),
                    },
                );
            }
        }
    }

    fn invoice(&self, name: &str) -> Option<Invoice> {
        self.invoices.get(name).map(|stored| stored.invoice.clone())
    }

    fn fields(&self, name: &str) -> Option<JoFotaraFields> {
        self.invoices.get(name).map(|stored| stored.fields.clone())
    }

    fn update_fields(&self, name: &str, fields: JoFotaraFields) {
        if let Some(mut stored) = self.invoices.get_mut(name) {
            stored.fields = fields;
        }
    }
}

pub struct InvoiceSubmissionService {
    client: Arc<JoFotaraClient>,
    store: Arc<dyn InvoiceStore>,
    last_response: RwLock<Option<String>>,
    last_xml: RwLock<Option<String>>,
}

impl InvoiceSubmissionService {
    pub fn new(client: Arc<JoFotaraClient>, store: Arc<dyn InvoiceStore>) -> Self {
        Self {
            client,
            store,
            last_response: RwLock::new(None),
            last_xml: RwLock::new(None),
        }
    }

    pub fn client(&self) -> &JoFotaraClient {
        &self.client
    }

    pub fn auto_send(&self) -> bool {
        self.client.config().auto_send
    }

    /// ERP submit hook. Stores the snapshot and, with auto-send on, submits
    /// it. Returns `None` when nothing was sent; never fails.
    pub async fn on_submit(&self, invoice: Invoice) -> Option<SubmissionResult> {
        let name = invoice.name.clone();
        self.store.save_invoice(invoice);

        if !self.auto_send() {
            tracing::debug!("Auto-send disabled, not submitting {}", sanitize_for_log(&name));
            return None;
        }

        match self.send_now(&name).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::error!("JoFotara on_submit failed for {}: {}", sanitize_for_log(&name), e);
                Some(SubmissionResult::failed(e.to_string()))
            }
        }
    }

    /// Submit the stored invoice now and write the outcome back.
    pub async fn send_now(&self, name: &str) -> Result<SubmissionResult> {
        let mut invoice = self
            .store
            .invoice(name)
            .ok_or_else(|| InvoiceServiceError::NotFound(name.to_string()))?;
        let mut fields = self.store.fields(name).unwrap_or_default();

        // Resubmissions keep the UUID JoFotara already knows.
        if invoice.jofotara_uuid.is_none() {
            invoice.jofotara_uuid = fields.jofotara_uuid.clone();
        }

        let result = self.client.submit(&invoice).await;
        self.remember_response(&result).await;

        if let Some(document) = &result.document {
            fields.jofotara_xml = Some(document.clone());
            *self.last_xml.write().await = Some(truncate(document, LAST_XML_PREVIEW));
        }

        fields.jofotara_status = Some(result.status.as_str().to_string());
        fields.jofotara_error = result.error_message.clone();
        match result.status {
            // Identifiers JoFotara issued earlier stay valid after a failed resend.
            SubmissionStatus::Failed => fields.jofotara_sent_at = None,
            _ => {
                if let Some(uuid) = result.uuid.clone() {
                    fields.jofotara_uuid = Some(uuid);
                }
                if let Some(qr) = result.qr.clone() {
                    fields.jofotara_qr_image = render_qr_image(name, &qr);
                    fields.jofotara_qr = Some(qr);
                }
                fields.jofotara_sent_at = Some(Utc::now());
            }
        }
        self.store.update_fields(name, fields);

        match result.status {
            SubmissionStatus::Failed => tracing::warn!(
                "JoFotara submission failed for {}: {}",
                sanitize_for_log(name),
                sanitize_option_for_log(&result.error_message)
            ),
            status => tracing::info!(
                "JoFotara submission for {}: {} (uuid={})",
                sanitize_for_log(name),
                status.as_str(),
                result.uuid.as_deref().unwrap_or("-")
            ),
        }

        Ok(result)
    }

    pub async fn cancel(&self, name: &str) -> Result<SubmissionResult> {
        let mut fields = self.existing_fields(name)?;
        let Some(uuid) = fields.jofotara_uuid.clone() else {
            return Ok(SubmissionResult::failed(format!(
                "Invoice {} has no JoFotara UUID",
                name
            )));
        };

        let result = self.client.cancel(&uuid).await;
        self.remember_response(&result).await;

        if result.is_success() {
            fields.jofotara_status = Some(STATUS_CANCELLED.to_string());
            fields.jofotara_error = None;
        } else {
            fields.jofotara_error = result.error_message.clone();
        }
        self.store.update_fields(name, fields);

        Ok(result)
    }

    /// Ask JoFotara for the current state of an already submitted invoice.
    pub async fn refresh_status(&self, name: &str) -> Result<SubmissionResult> {
        let mut fields = self.existing_fields(name)?;
        let Some(uuid) = fields.jofotara_uuid.clone() else {
            return Ok(SubmissionResult::failed(format!(
                "Invoice {} has no JoFotara UUID",
                name
            )));
        };

        let result = self.client.query(&uuid).await;
        self.remember_response(&result).await;

        match result.status {
            SubmissionStatus::Failed => {
                fields.jofotara_error = result.error_message.clone();
            }
            status => {
                fields.jofotara_status = Some(status.as_str().to_string());
                fields.jofotara_error = None;
                if let Some(qr) = result.qr.clone() {
                    if fields.jofotara_qr.as_deref() != Some(qr.as_str()) {
                        fields.jofotara_qr_image = render_qr_image(name, &qr);
                    }
                    fields.jofotara_qr = Some(qr);
                }
            }
        }
        self.store.update_fields(name, fields);

        Ok(result)
    }

    /// Render the stored QR payload to a PNG data URI and keep it on the
    /// invoice as `jofotara_qr_image`.
    pub async fn attach_qr_image(&self, name: &str) -> Result<String> {
        let mut fields = self.existing_fields(name)?;
        let qr = fields
            .jofotara_qr
            .clone()
            .filter(|qr| !qr.trim().is_empty())
            .ok_or_else(|| InvoiceServiceError::MissingQr(name.to_string()))?;

        let image = render_png_data_uri(&qr)?;
        fields.jofotara_qr_image = Some(image.clone());
        self.store.update_fields(name, fields);

        tracing::info!("Attached JoFotara QR image to {}", sanitize_for_log(name));
        Ok(image)
    }

    pub fn fields(&self, name: &str) -> Result<JoFotaraFields> {
        self.existing_fields(name)
    }

    /// Most recent raw JoFotara response, truncated for display.
    pub async fn last_response(&self) -> Option<String> {
        self.last_response.read().await.clone()
    }

    /// Most recently submitted document.
    pub async fn last_xml(&self) -> Option<String> {
        self.last_xml.read().await.clone()
    }

    fn existing_fields(&self, name: &str) -> Result<JoFotaraFields> {
        self.store
            .fields(name)
            .ok_or_else(|| InvoiceServiceError::NotFound(name.to_string()))
    }

    async fn remember_response(&self, result: &SubmissionResult) {
        let preview = match (&result.raw_response, &result.error_message) {
            (Some(raw), _) => raw.to_string(),
            (None, Some(message)) => message.clone(),
            (None, None) => return,
        };
        *self.last_response.write().await = Some(truncate(&preview, LAST_RESPONSE_PREVIEW));
    }
}

/// A QR the image cannot be rendered for is still kept; only the image is skipped.
fn render_qr_image(name: &str, qr: &str) -> Option<String> {
    match render_png_data_uri(qr) {
        Ok(image) => Some(image),
        Err(e) => {
            tracing::warn!("Could not render JoFotara QR image for {}: {}", sanitize_for_log(name), e);
            None
        }
    }
}
