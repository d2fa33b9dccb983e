use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Success,
    Failed,
    Pending,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Success => "Success",
            SubmissionStatus::Failed => "Failed",
            SubmissionStatus::Pending => "Pending",
        }
    }
}

/// Outcome of one call to the JoFotara API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub status: SubmissionStatus,
    pub uuid: Option<String>,
    pub qr: Option<String>,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
    /// Submitted document; kept off the wire, the invoice fields carry it.
    #[serde(skip)]
    pub document: Option<String>,
}

impl SubmissionResult {
    pub fn success(uuid: Option<String>, qr: Option<String>) -> Self {
        Self {
            status: SubmissionStatus::Success,
            uuid,
            qr,
            error_message: None,
            raw_response: None,
            document: None,
        }
    }

    pub fn pending(uuid: Option<String>) -> Self {
        Self {
            status: SubmissionStatus::Pending,
            uuid,
            qr: None,
            error_message: None,
            raw_response: None,
            document: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SubmissionStatus::Failed,
            uuid: None,
            qr: None,
            error_message: Some(message.into()),
            raw_response: None,
            document: None,
        }
    }

    pub fn with_raw_response(mut self, raw: serde_json::Value) -> Self {
        self.raw_response = Some(raw);
        self
    }

    pub fn with_document(mut self, document: String) -> Self {
        self.document = Some(document);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == SubmissionStatus::Success
    }
}
