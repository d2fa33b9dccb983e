// JoFotara response interpretation
// The service has answered with both its native EINV_* keys and plain
// uuid/qr keys across environments; every known alias is accepted.

use reqwest::StatusCode;
use serde_json::Value;

use crate::models::{SubmissionResult, SubmissionStatus};

use super::errors::JoFotaraError;

const UUID_KEYS: [&str; 6] = ["EINV_INV_UUID", "UUID", "uuid", "invoice_uuid", "invoiceUUID", "id"];
const QR_KEYS: [&str; 4] = ["EINV_QR", "qr", "qrCode", "qr_code"];
const STATUS_KEYS: [&str; 2] = ["EINV_STATUS", "status"];

const PENDING_STATUSES: [&str; 4] = ["PENDING", "IN_PROGRESS", "QUEUED", "PROCESSING"];
const REJECTED_STATUSES: [&str; 4] = ["NOT_SUBMITTED", "REJECTED", "ERROR", "FAILED"];

/// Longest response body echoed into an error message.
pub const MAX_ERROR_BODY: usize = 1000;

pub fn interpret(status: StatusCode, body: &str) -> SubmissionResult {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let data = parsed.clone().unwrap_or_else(|| serde_json::json!({ "text": body }));

    if !status.is_success() {
        let detail = match &parsed {
            Some(value) => value.to_string(),
            None => body.trim().to_string(),
        };
        let error = JoFotaraError::RemoteError(status.as_u16(), truncate(&detail, MAX_ERROR_BODY));
        return SubmissionResult::failed(error.to_string()).with_raw_response(data);
    }

    if body.trim().is_empty() {
        return SubmissionResult::success(None, None);
    }

    if !matches!(parsed, Some(Value::Object(_))) {
        let message = format!(
            "JoFotara returned an unreadable response: {}",
            truncate(body.trim(), MAX_ERROR_BODY)
        );
        return SubmissionResult::failed(message).with_raw_response(data);
    }

    let uuid = first_string(&data, &UUID_KEYS);
    let qr = first_string(&data, &QR_KEYS);
    let remote_status = first_string(&data, &STATUS_KEYS).map(|s| s.to_uppercase());

    let result = match remote_status.as_deref() {
        Some(s) if REJECTED_STATUSES.contains(&s) => {
            SubmissionResult::failed(rejection_message(&data, s))
        }
        Some(s) if PENDING_STATUSES.contains(&s) => SubmissionResult::pending(uuid),
        _ => SubmissionResult::success(uuid, qr),
    };

    result.with_raw_response(data)
}

/// `EINV_RESULTS.ERRORS[*].EINV_MESSAGE` joined, or the status itself.
fn rejection_message(data: &Value, status: &str) -> String {
    let messages: Vec<String> = data
        .pointer("/EINV_RESULTS/ERRORS")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| {
                    e.get("EINV_MESSAGE")
                        .or_else(|| e.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default();

    if messages.is_empty() {
        format!("JoFotara rejected the invoice ({})", status)
    } else {
        format!("JoFotara rejected the invoice ({}): {}", status, messages.join("; "))
    }
}

fn first_string(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .filter_map(|value| match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .find(|s| !s.is_empty())
}

/// Truncate on a char boundary.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
