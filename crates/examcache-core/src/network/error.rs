use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Peer rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl NetworkError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
            None => body.to_string(),
            Some((cut, _)) => format!(
                "{}... (truncated, {} total bytes)",
                &body[..cut],
                body.len()
            ),
        }
    }

    /// Error for a response the peer answered with a non-2xx status.
    pub fn from_status(status: u16, body: &str) -> Self {
        NetworkError::Rejected {
            status,
            body: Self::truncate_body(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_keeps_short_body() {
        let err = NetworkError::from_status(503, "maintenance");
        assert_eq!(
            err.to_string(),
            "Peer rejected request with status 503: maintenance"
        );
    }

    #[test]
    fn test_from_status_truncates_long_body() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        match NetworkError::from_status(500, &body) {
            NetworkError::Rejected { status, body: truncated } => {
                assert_eq!(status, 500);
                assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
                assert!(truncated.ends_with("(truncated, 520 total bytes)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "ข".repeat(MAX_ERROR_BODY_LENGTH + 1);
        let truncated = NetworkError::truncate_body(&body);
        assert!(truncated.starts_with(&"ข".repeat(MAX_ERROR_BODY_LENGTH)));
    }
}
