use thiserror::Error;

/// Failure of a model call, classified for the retry policy.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP 429 or an exhausted quota
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Model missing or temporarily unavailable
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let lowered = body.to_lowercase();
        let detail = format!("HTTP {}: {}", status, truncate(body, 300));

        if status == 429 || lowered.contains("resource_exhausted") || lowered.contains("quota") {
            LlmError::RateLimited(detail)
        } else if status == 404
            || status == 503
            || lowered.contains("not found")
            || lowered.contains("unavailable")
        {
            LlmError::ModelUnavailable(detail)
        } else {
            LlmError::Request(detail)
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        LlmError::Request(error.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        assert!(matches!(
            LlmError::from_status(429, "slow down"),
            LlmError::RateLimited(_)
        ));
    }

    #[test]
    fn quota_body_is_rate_limited_regardless_of_status() {
        let body = r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            LlmError::from_status(400, body),
            LlmError::RateLimited(_)
        ));
    }

    #[test]
    fn missing_model_is_unavailable() {
        assert!(matches!(
            LlmError::from_status(404, "models/foo is not found"),
            LlmError::ModelUnavailable(_)
        ));
        assert!(matches!(
            LlmError::from_status(503, "overloaded"),
            LlmError::ModelUnavailable(_)
        ));
    }

    #[test]
    fn other_statuses_are_plain_request_failures() {
        assert!(matches!(
            LlmError::from_status(400, "bad request"),
            LlmError::Request(_)
        ));
    }
}
