//! HTTP plumbing shared by the API adapters.

use std::time::Duration;

use reqwest::Response;

use crate::{NudgeError, Result};

/// Default per-request timeout for generation calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for liveness probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Check response status and map to appropriate error.
///
/// On success the response is handed back untouched so the caller can read
/// the body (or stream it).
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        401 | 403 => Err(NudgeError::AuthenticationFailed),
        429 => {
            // Try to parse retry-after header
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(NudgeError::RateLimited { retry_after })
        }
        code => {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.to_string()
            } else {
                body.chars().take(500).collect()
            };
            Err(NudgeError::Api {
                status: code,
                message,
            })
        }
    }
}
