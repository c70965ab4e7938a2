use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::{duration_ms, CheckResult, CODE_ERROR};
use crate::target::UrlTarget;

/// Issue one GET against `target.url` and classify the response.
pub async fn check_api(client: &Client, target: &UrlTarget, timeout: Duration) -> CheckResult {
    let timeout_ms = duration_ms(timeout);

    let response = match client.get(&target.url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            warn!(target = %target.name, timeout_ms, "API check timed out");
            return CheckResult::timeout(timeout_ms);
        }
        Err(e) => {
            warn!(target = %target.name, error = %e, "API check request failed");
            return CheckResult::new(CODE_ERROR, format!("Error: {}", e));
        }
    };

    let status = response.status().as_u16();
    if status != 200 {
        debug!(target = %target.name, status, "API check returned non-200 status");
        return CheckResult::new(i64::from(status), format!("Unexpected status: {}", status));
    }

    if !target.check_json && !target.check_text {
        return CheckResult::ok("OK");
    }

    match response.text().await {
        Ok(body) => validate_body(target, status, &body),
        Err(e) if e.is_timeout() => CheckResult::timeout(timeout_ms),
        Err(e) => CheckResult::new(CODE_ERROR, format!("Error: {}", e)),
    }
}

/// Apply the JSON and text content checks to a 200 response body.
///
/// Content failures keep the HTTP status as the code; only the message
/// records what went wrong.
pub fn validate_body(target: &UrlTarget, status: u16, body: &str) -> CheckResult {
    let code = i64::from(status);
    if target.check_json && serde_json::from_str::<serde_json::Value>(body).is_err() {
        return CheckResult::new(code, format!("Invalid JSON response: {}", status));
    }

    if target.check_text {
        if !target.ok_text.is_empty() && !body.contains(&target.ok_text) {
            return CheckResult::new(code, "Required text not found");
        }
        if !target.error_text.is_empty() && body.contains(&target.error_text) {
            return CheckResult::new(code, "Error");
        }
    }

    CheckResult::new(code, "OK")
}
