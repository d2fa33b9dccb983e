// JoFotara submission client
// Authenticate, build the payload, call the API, and fold every outcome into
// a SubmissionResult. Failures are never propagated to the caller.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use url::Url;

use crate::config::{AuthMode, ConnectorConfig, ConnectorConfigError};
use crate::middleware::metrics;
use crate::models::{Invoice, SubmissionResult};
use crate::utils::log_sanitizer::{mask_headers, sanitize_for_log};

use super::auth::{AccessToken, Authenticator};
use super::errors::{JoFotaraError, Result};
use super::payload::{build_payload, EncodedPayload, PayloadContext};
use super::response;

pub const ACTIVITY_NUMBER_HEADER: &str = "Activity-Number";
/// Some environments expect the activity number under this name instead.
pub const KEY_HEADER: &str = "Key";

pub struct JoFotaraClient {
    config: ConnectorConfig,
    http_client: Client,
    authenticator: Authenticator,
}

impl JoFotaraClient {
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(JoFotaraError::transport)?;
        let authenticator = Authenticator::from_config(&config)?;

        tracing::info!(
            "JoFotara client ready: auth={}, format={}, submit_url={}",
            authenticator.mode().as_str(),
            config.payload_format.as_str(),
            config.submit_url
        );

        Ok(Self {
            config,
            http_client,
            authenticator,
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.authenticator.mode()
    }

    pub async fn authenticate(&self) -> Result<AccessToken> {
        self.authenticator.authenticate(&self.http_client).await
    }

    pub fn build_payload(&self, invoice: &Invoice) -> Result<EncodedPayload> {
        let ctx = PayloadContext {
            activity_number: self.config.activity_digits().ok(),
            seller_tax_number: self.config.seller_tax_number.clone(),
        };
        build_payload(invoice, self.config.payload_format, &ctx)
    }

    /// Submit one invoice. Not idempotent: each call is a new submission.
    /// Once a document was built it rides along on the result, failed or not.
    pub async fn submit(&self, invoice: &Invoice) -> SubmissionResult {
        let started = Instant::now();
        // Payload problems must surface before any network traffic.
        let result = match self.build_payload(invoice) {
            Ok(payload) => self
                .try_submit(invoice, &payload)
                .await
                .unwrap_or_else(|e| failure("submit", &invoice.name, e))
                .with_document(payload.document),
            Err(e) => failure("submit", &invoice.name, e),
        };

        metrics::record_jofotara_call("submit", result.status, started.elapsed());
        result
    }

    pub async fn cancel(&self, uuid: &str) -> SubmissionResult {
        let started = Instant::now();
        let result = self
            .try_cancel(uuid)
            .await
            .unwrap_or_else(|e| failure("cancel", uuid, e));

        metrics::record_jofotara_call("cancel", result.status, started.elapsed());
        result
    }

    pub async fn query(&self, uuid: &str) -> SubmissionResult {
        let started = Instant::now();
        let result = self
            .try_query(uuid)
            .await
            .unwrap_or_else(|e| failure("query", uuid, e));

        metrics::record_jofotara_call("query", result.status, started.elapsed());
        result
    }

    async fn try_submit(&self, invoice: &Invoice, payload: &EncodedPayload) -> Result<SubmissionResult> {
        let url = self.config.submit_endpoint()?;

        tracing::info!(
            "Submitting invoice {} to JoFotara (uuid={}, format={})",
            sanitize_for_log(&invoice.name),
            payload.invoice_uuid,
            payload.format.as_str()
        );

        let body = json!({ "invoice": &payload.encoded });
        self.send(Method::POST, url, Some(&body)).await
    }

    async fn try_cancel(&self, uuid: &str) -> Result<SubmissionResult> {
        let url = self.config.cancel_endpoint()?;
        let body = json!({ "uuid": uuid });
        self.send(Method::POST, url, Some(&body)).await
    }

    async fn try_query(&self, uuid: &str) -> Result<SubmissionResult> {
        let url = self.config.query_endpoint()?;
        let url = join_segment(url, uuid)?;
        self.send(Method::GET, url, None).await
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<SubmissionResult> {
        let token = self.authenticate().await?;
        let headers = self.request_headers(&token)?;

        tracing::debug!("JoFotara {} {} headers={:?}", method, url, mask_headers(&headers));

        let mut request = self.http_client.request(method.clone(), url.clone()).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(JoFotaraError::transport)?;
        let status = response.status();
        let text = response.text().await.map_err(JoFotaraError::transport)?;

        if status == StatusCode::UNAUTHORIZED {
            self.authenticator.invalidate().await;
        }

        if status.is_success() {
            tracing::info!("JoFotara {} {} -> {}", method, url, status.as_u16());
        } else {
            tracing::error!(
                "JoFotara {} {} -> {}: {}",
                method,
                url,
                status.as_u16(),
                sanitize_for_log(&text)
            );
        }

        Ok(response::interpret(status, &text))
    }

    fn request_headers(&self, token: &AccessToken) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, config_header(&self.config.accept_language)?);

        let activity = self.config.activity_digits()?;
        headers.insert(
            HeaderName::from_static("activity-number"),
            config_header(&activity)?,
        );
        headers.insert(HeaderName::from_static("key"), config_header(&activity)?);

        headers.extend(token.headers()?);
        Ok(headers)
    }
}

fn config_header(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        JoFotaraError::ConfigError(ConnectorConfigError::InvalidValue {
            key: "header",
            value: value.to_string(),
        })
    })
}

fn join_segment(mut url: Url, segment: &str) -> Result<Url> {
    let invalid = ConnectorConfigError::InvalidUrl {
        url: url.to_string(),
        reason: "cannot be a base".to_string(),
    };
    url.path_segments_mut()
        .map_err(|_| invalid)?
        .pop_if_empty()
        .push(segment.trim());
    Ok(url)
}

fn failure(operation: &str, subject: &str, err: JoFotaraError) -> SubmissionResult {
    tracing::warn!(
        "JoFotara {} failed for {}: {}",
        operation,
        sanitize_for_log(subject),
        err
    );
    SubmissionResult::failed(err.to_string())
}
