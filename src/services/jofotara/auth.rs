// JoFotara credential strategies
// OAuth 2.0 client-credentials with an in-process token cache, or a static
// device user + secret pair sent on every request.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

use crate::config::{AuthMode, ConnectorConfig, ConnectorConfigError};
use crate::utils::log_sanitizer::sanitize_for_log;

use super::errors::{JoFotaraError, Result};

/// Refresh this long before the advertised expiry.
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;
/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

pub const CLIENT_ID_HEADER: &str = "Client-Id";
pub const SECRET_KEY_HEADER: &str = "Secret-Key";

/// Credential produced by [`Authenticator::authenticate`].
#[derive(Debug, Clone, PartialEq)]
pub enum AccessToken {
    Bearer(String),
    Device { client_id: String, secret_key: String },
}

impl AccessToken {
    /// Credential headers for a JoFotara request.
    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        match self {
            AccessToken::Bearer(token) => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
            }
            AccessToken::Device { client_id, secret_key } => {
                headers.insert(CLIENT_ID_HEADER, header_value(client_id)?);
                headers.insert(SECRET_KEY_HEADER, header_value(secret_key)?);
            }
        }
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| JoFotaraError::AuthError("credential contains invalid header characters".to_string()))
}

#[derive(Debug, Clone)]
struct TokenCache {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct OAuth2ClientCredentials {
    token_endpoint: Url,
    client_id: String,
    client_secret: String,
    token_cache: Arc<RwLock<Option<TokenCache>>>,
}

impl OAuth2ClientCredentials {
    pub fn new(token_endpoint: Url, client_id: &str, client_secret: &str) -> Self {
        Self {
            token_endpoint,
            client_id: client_id.trim().to_string(),
            client_secret: client_secret.trim().to_string(),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    async fn access_token(&self, http_client: &Client) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = &*cache {
                let buffer = Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS);
                if Utc::now() + buffer < cached.expires_at {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let token = self.request_new_token(http_client).await?;
        let access_token = token.access_token.clone();
        *self.token_cache.write().await = Some(token);

        Ok(access_token)
    }

    async fn request_new_token(&self, http_client: &Client) -> Result<TokenCache> {
        tracing::debug!("Requesting JoFotara access token from {}", self.token_endpoint);

        let response = http_client
            .post(self.token_endpoint.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(JoFotaraError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(
                "JoFotara token endpoint returned {}: {}",
                status,
                sanitize_for_log(&error_text)
            );
            return Err(JoFotaraError::AuthError(format!(
                "token endpoint returned HTTP {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: Option<String>,
            expires_in: Option<i64>,
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| JoFotaraError::AuthError(format!("unreadable token response: {}", e)))?;

        let access_token = token_response
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| JoFotaraError::AuthError("token response has no access_token".to_string()))?;

        let lifetime = token_response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        Ok(TokenCache {
            access_token,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        })
    }

    pub async fn invalidate(&self) {
        *self.token_cache.write().await = None;
    }
}

#[derive(Debug, Clone)]
pub struct DeviceCredentials {
    device_id: String,
    device_secret: String,
}

impl DeviceCredentials {
    pub fn new(device_id: &str, device_secret: &str) -> Self {
        Self {
            device_id: device_id.trim().to_string(),
            device_secret: device_secret.trim().to_string(),
        }
    }
}

/// One variant per [`AuthMode`].
#[derive(Debug)]
pub enum Authenticator {
    OAuth2(OAuth2ClientCredentials),
    Device(DeviceCredentials),
}

impl Authenticator {
    pub fn from_config(config: &ConnectorConfig) -> Result<Self> {
        match config.auth_mode {
            AuthMode::OAuth2ClientCredentials => {
                let client_id = non_blank(&config.client_id)
                    .ok_or(ConnectorConfigError::Missing("client_id"))?;
                let client_secret = non_blank(&config.client_secret)
                    .ok_or(ConnectorConfigError::Missing("client_secret"))?;
                Ok(Authenticator::OAuth2(OAuth2ClientCredentials::new(
                    config.token_endpoint()?,
                    client_id,
                    client_secret,
                )))
            }
            AuthMode::DeviceUserSecret => {
                // Older settings stored the device pair in the client fields.
                let device_id = non_blank(&config.device_id)
                    .or_else(|| non_blank(&config.client_id))
                    .ok_or(ConnectorConfigError::Missing("device_id"))?;
                let device_secret = non_blank(&config.device_secret)
                    .or_else(|| non_blank(&config.client_secret))
                    .ok_or(ConnectorConfigError::Missing("device_secret"))?;
                Ok(Authenticator::Device(DeviceCredentials::new(device_id, device_secret)))
            }
        }
    }

    pub fn mode(&self) -> AuthMode {
        match self {
            Authenticator::OAuth2(_) => AuthMode::OAuth2ClientCredentials,
            Authenticator::Device(_) => AuthMode::DeviceUserSecret,
        }
    }

    /// Token round-trip for OAuth2 (cached); device mode never touches the network.
    pub async fn authenticate(&self, http_client: &Client) -> Result<AccessToken> {
        match self {
            Authenticator::OAuth2(oauth) => {
                let token = oauth.access_token(http_client).await?;
                Ok(AccessToken::Bearer(token))
            }
            Authenticator::Device(device) => Ok(AccessToken::Device {
                client_id: device.device_id.clone(),
                secret_key: device.device_secret.clone(),
            }),
        }
    }

    /// Drop any cached token, e.g. after the API answered 401.
    pub async fn invalidate(&self) {
        if let Authenticator::OAuth2(oauth) = self {
            oauth.invalidate().await;
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
