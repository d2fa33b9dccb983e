// ============================================================================
// Log Sanitization
// ============================================================================
//
// Invoice names, party names and JoFotara response bodies reach the logs
// verbatim from outside. Everything user- or remote-supplied goes through
// `sanitize_for_log` first: newlines, ANSI escapes and control characters
// are stripped and the value is truncated.
//
// Outbound request headers carry credentials and are logged only through
// `mask_headers`.
//
// ============================================================================

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;

/// Maximum number of characters kept from one logged value
const MAX_LOG_LENGTH: usize = 300;

/// Replacement for secret header values
pub const MASK: &str = "********";

/// Header names whose values never reach the logs (compared lowercase).
const SECRET_HEADERS: [&str; 4] = ["authorization", "secret-key", "device-secret", "client-secret"];

static ANSI_ESCAPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").unwrap());

/// Sanitize untrusted input for safe logging
///
/// ```
/// use jofotara_connector::utils::log_sanitizer::sanitize_for_log;
///
/// assert_eq!(
///     sanitize_for_log("ACC-SINV-0001\nINFO: Fake log entry"),
///     "ACC-SINV-0001 INFO: Fake log entry"
/// );
/// assert_eq!(sanitize_for_log("test\x1b[31mred\x1b[0m"), "testred");
/// ```
pub fn sanitize_for_log(input: &str) -> String {
    let no_ansi = ANSI_ESCAPE_REGEX.replace_all(input, "");

    let cleaned: String = no_ansi
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            other => other,
        })
        .filter(|c| {
            let code = *c as u32;
            code >= 0x20 && code != 0x7F
        })
        .collect();

    // Arabic party names are common, so cut on char boundaries.
    match cleaned.char_indices().nth(MAX_LOG_LENGTH) {
        Some((idx, _)) => format!("{}...", &cleaned[..idx]),
        None => cleaned,
    }
}

pub fn sanitize_option_for_log(input: &Option<String>) -> String {
    match input {
        Some(value) => sanitize_for_log(value),
        None => "None".to_string(),
    }
}

/// Header pairs for logging, with credential values replaced by [`MASK`].
pub fn mask_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str().to_string();
            let shown = if SECRET_HEADERS.contains(&name.as_str()) {
                MASK.to_string()
            } else {
                sanitize_for_log(value.to_str().unwrap_or("<binary>"))
            };
            (name, shown)
        })
        .collect()
}
