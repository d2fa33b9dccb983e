//! JoFotara connector settings
//!
//! Administrator-managed settings for the e-invoicing connector. The struct is
//! built once at startup (or by tests) and handed to the client, so nothing in
//! the client reads ambient configuration.

use std::env;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://backend.jofotara.gov.jo";
pub const DEFAULT_SUBMIT_PATH: &str = "/core/invoices/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "ar";

/// Connector configuration errors
#[derive(Debug, Error)]
pub enum ConnectorConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid auth mode: {0}")]
    InvalidAuthMode(String),

    #[error("Invalid payload format: {0}")]
    InvalidPayloadFormat(String),

    #[error("Activity number must contain 1 to 15 digits")]
    InvalidActivityNumber,

    #[error("Invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Credential scheme used against the JoFotara API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// client_id/client_secret exchanged for a bearer token at `token_url`
    #[serde(rename = "oauth2")]
    OAuth2ClientCredentials,
    /// Static device user + secret sent on every request
    #[serde(rename = "device")]
    DeviceUserSecret,
}

impl FromStr for AuthMode {
    type Err = ConnectorConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oauth2" | "oauth2_client_credentials" | "client_credentials" => {
                Ok(Self::OAuth2ClientCredentials)
            }
            "device" | "device_user_secret" => Ok(Self::DeviceUserSecret),
            _ => Err(ConnectorConfigError::InvalidAuthMode(s.to_string())),
        }
    }
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OAuth2ClientCredentials => "oauth2",
            Self::DeviceUserSecret => "device",
        }
    }
}

/// Serialization used for the invoice document before base64 encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Xml,
    Json,
}

impl FromStr for PayloadFormat {
    type Err = ConnectorConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xml" | "ubl" => Ok(Self::Xml),
            "json" => Ok(Self::Json),
            _ => Err(ConnectorConfigError::InvalidPayloadFormat(s.to_string())),
        }
    }
}

impl PayloadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub auth_mode: AuthMode,
    /// Relative endpoint paths are resolved against this
    pub base_url: String,
    pub token_url: Option<String>,
    pub submit_url: String,
    pub cancel_url: Option<String>,
    pub query_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub device_id: Option<String>,
    pub device_secret: Option<String>,
    pub payload_format: PayloadFormat,
    pub auto_send: bool,
    pub activity_number: String,
    pub seller_tax_number: Option<String>,
    pub request_timeout_secs: u64,
    pub accept_language: String,
}

impl ConnectorConfig {
    /// Device-credential config with defaults for everything optional.
    pub fn device(device_id: &str, device_secret: &str, activity_number: &str) -> Self {
        Self {
            auth_mode: AuthMode::DeviceUserSecret,
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: None,
            submit_url: DEFAULT_SUBMIT_PATH.to_string(),
            cancel_url: None,
            query_url: None,
            client_id: None,
            client_secret: None,
            device_id: Some(device_id.to_string()),
            device_secret: Some(device_secret.to_string()),
            payload_format: PayloadFormat::Xml,
            auto_send: false,
            activity_number: activity_number.to_string(),
            seller_tax_number: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
        }
    }

    /// OAuth2 client-credentials config with defaults for everything optional.
    pub fn oauth2(
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        activity_number: &str,
    ) -> Self {
        Self {
            auth_mode: AuthMode::OAuth2ClientCredentials,
            token_url: Some(token_url.to_string()),
            client_id: Some(client_id.to_string()),
            client_secret: Some(client_secret.to_string()),
            device_id: None,
            device_secret: None,
            ..Self::device("", "", activity_number)
        }
    }

    pub fn from_env() -> Result<Self, ConnectorConfigError> {
        let auth_mode: AuthMode = env::var("JOFOTARA_AUTH_MODE")
            .unwrap_or_else(|_| "device".to_string())
            .parse()?;
        let payload_format: PayloadFormat = env::var("JOFOTARA_PAYLOAD_FORMAT")
            .unwrap_or_else(|_| "xml".to_string())
            .parse()?;

        let request_timeout_secs = match optional_env("JOFOTARA_TIMEOUT_SECS") {
            Some(raw) => raw.parse().map_err(|_| ConnectorConfigError::InvalidValue {
                key: "JOFOTARA_TIMEOUT_SECS",
                value: raw,
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let auto_send = optional_env("JOFOTARA_AUTO_SEND")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let config = Self {
            auth_mode,
            base_url: optional_env("JOFOTARA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            token_url: optional_env("JOFOTARA_TOKEN_URL"),
            submit_url: optional_env("JOFOTARA_SUBMIT_URL")
                .unwrap_or_else(|| DEFAULT_SUBMIT_PATH.to_string()),
            cancel_url: optional_env("JOFOTARA_CANCEL_URL"),
            query_url: optional_env("JOFOTARA_QUERY_URL"),
            client_id: optional_env("JOFOTARA_CLIENT_ID"),
            client_secret: optional_env("JOFOTARA_CLIENT_SECRET"),
            device_id: optional_env("JOFOTARA_DEVICE_ID"),
            device_secret: optional_env("JOFOTARA_DEVICE_SECRET"),
            payload_format,
            auto_send,
            activity_number: optional_env("JOFOTARA_ACTIVITY_NUMBER").unwrap_or_default(),
            seller_tax_number: optional_env("JOFOTARA_SELLER_TAX_NUMBER"),
            request_timeout_secs,
            accept_language: optional_env("JOFOTARA_ACCEPT_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_ACCEPT_LANGUAGE.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConnectorConfigError> {
        match self.auth_mode {
            AuthMode::OAuth2ClientCredentials => {
                if is_blank(&self.token_url) {
                    return Err(ConnectorConfigError::Missing("token_url"));
                }
                if is_blank(&self.client_id) {
                    return Err(ConnectorConfigError::Missing("client_id"));
                }
                if is_blank(&self.client_secret) {
                    return Err(ConnectorConfigError::Missing("client_secret"));
                }
            }
            AuthMode::DeviceUserSecret => {
                if is_blank(&self.device_id) && is_blank(&self.client_id) {
                    return Err(ConnectorConfigError::Missing("device_id"));
                }
                if is_blank(&self.device_secret) && is_blank(&self.client_secret) {
                    return Err(ConnectorConfigError::Missing("device_secret"));
                }
            }
        }

        self.activity_digits()?;
        self.submit_endpoint()?;
        Ok(())
    }

    /// Activity number with everything but digits stripped.
    pub fn activity_digits(&self) -> Result<String, ConnectorConfigError> {
        let digits: String = self
            .activity_number
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() || digits.len() > 15 {
            return Err(ConnectorConfigError::InvalidActivityNumber);
        }
        Ok(digits)
    }

    pub fn token_endpoint(&self) -> Result<Url, ConnectorConfigError> {
        let path = self
            .token_url
            .as_deref()
            .ok_or(ConnectorConfigError::Missing("token_url"))?;
        self.resolve(path)
    }

    pub fn submit_endpoint(&self) -> Result<Url, ConnectorConfigError> {
        self.resolve(&self.submit_url)
    }

    pub fn cancel_endpoint(&self) -> Result<Url, ConnectorConfigError> {
        let path = self
            .cancel_url
            .as_deref()
            .ok_or(ConnectorConfigError::Missing("cancel_url"))?;
        self.resolve(path)
    }

    pub fn query_endpoint(&self) -> Result<Url, ConnectorConfigError> {
        let path = self
            .query_url
            .as_deref()
            .ok_or(ConnectorConfigError::Missing("query_url"))?;
        self.resolve(path)
    }

    /// Join `path` onto `base_url`. Absolute URLs are returned unchanged.
    pub fn resolve(&self, path: &str) -> Result<Url, ConnectorConfigError> {
        let path = path.trim();
        let base = format!("{}/", self.base_url.trim().trim_end_matches('/'));
        let invalid = |url: &str, e: url::ParseError| ConnectorConfigError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let base = Url::parse(&base).map_err(|e| invalid(&base, e))?;
        base.join(path.trim_start_matches('/'))
            .map_err(|e| invalid(path, e))
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}
