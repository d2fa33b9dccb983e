use thiserror::Error;

use crate::config::ConnectorConfigError;

#[derive(Error, Debug)]
pub enum JoFotaraError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Invoice serialization failed: {0}")]
    SerializationError(String),

    #[error("Network error: {0}")]
    TransportError(String),

    #[error("JoFotara HTTP {0}: {1}")]
    RemoteError(u16, String),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] ConnectorConfigError),
}

pub type Result<T> = std::result::Result<T, JoFotaraError>;

impl JoFotaraError {
    /// Transport failures keep reqwest's own wording, with timeouts called out.
    pub fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            JoFotaraError::TransportError(format!("request timed out: {}", err))
        } else if err.is_connect() {
            JoFotaraError::TransportError(format!("connection failed: {}", err))
        } else {
            JoFotaraError::TransportError(err.to_string())
        }
    }
}

impl From<quick_xml::Error> for JoFotaraError {
    fn from(err: quick_xml::Error) -> Self {
        JoFotaraError::SerializationError(format!("XML: {}", err))
    }
}

impl From<serde_json::Error> for JoFotaraError {
    fn from(err: serde_json::Error) -> Self {
        JoFotaraError::SerializationError(format!("JSON: {}", err))
    }
}
