pub mod middleware;

use serde::Deserialize;

/// The error envelope Google APIs (and the Firestore emulator) return.
#[derive(Debug, Deserialize)]
pub struct GoogleErrorResponse {
    pub error: GoogleErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct GoogleErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
}

impl GoogleErrorResponse {
    pub fn display_message(&self) -> String {
        match &self.error.status {
            Some(status) => format!("{} {}: {}", self.error.code, status, self.error.message),
            None => format!("{}: {}", self.error.code, self.error.message),
        }
    }
}

/// Turns a non-success response into a one-line message prefixed with `context`.
pub async fn parse_error_response(response: reqwest::Response, context: &str) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    describe_error(status, &body, context)
}

/// Formats an already-read error body the same way as [`parse_error_response`].
pub fn describe_error(status: reqwest::StatusCode, body: &str, context: &str) -> String {
    match serde_json::from_str::<GoogleErrorResponse>(body) {
        Ok(error_resp) => format!("{}: {}", context, error_resp.display_message()),
        Err(_) if body.is_empty() => format!("{}: {}", context, status),
        Err(_) => format!("{}: {}: {}", context, status, body),
    }
}
