//! Classification of failures reported by external providers.

use reqwest::StatusCode;
use thiserror::Error;

/// Longest provider message kept in an error, in characters.
const MAX_MESSAGE_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Connection failure or timeout; the provider never answered.
    #[error("{provider} is unavailable: {reason}")]
    Unavailable {
        provider: &'static str,
        reason: String,
    },
    /// The provider answered with a client error (bad credentials, quota, ...).
    #[error("{provider} rejected the request ({status}): {message}")]
    Rejected {
        provider: &'static str,
        status: u16,
        message: String,
    },
    /// Provider-side failure, or a reply that could not be understood.
    #[error("{provider} failed: {message}")]
    Failed {
        provider: &'static str,
        status: Option<u16>,
        message: String,
    },
}

impl UpstreamError {
    pub fn from_transport(provider: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            return UpstreamError::Failed {
                provider,
                status: err.status().map(|s| s.as_u16()),
                message: format!("undecodable response: {err}"),
            };
        }
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection failed".to_string()
        } else {
            err.to_string()
        };
        UpstreamError::Unavailable { provider, reason }
    }

    pub fn from_status(provider: &'static str, status: StatusCode, message: &str) -> Self {
        let message = truncate(message);
        if status.is_client_error() {
            UpstreamError::Rejected {
                provider,
                status: status.as_u16(),
                message,
            }
        } else {
            UpstreamError::Failed {
                provider,
                status: Some(status.as_u16()),
                message,
            }
        }
    }

    pub fn invalid_response(provider: &'static str, message: impl Into<String>) -> Self {
        UpstreamError::Failed {
            provider,
            status: None,
            message: message.into(),
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            UpstreamError::Unavailable { provider, .. }
            | UpstreamError::Rejected { provider, .. }
            | UpstreamError::Failed { provider, .. } => provider,
        }
    }
}

/// Pulls a readable message out of a provider error body.
///
/// Understands `{"error": {"message": ...}}`, `{"error": "..."}` and
/// `{"message": ...}`; anything else is returned as raw text.
pub fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.get("error"))
            .or_else(|| value.get("message"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    });
    match message {
        Some(message) => message,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.trim().to_string(),
    }
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_LEN {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(MAX_MESSAGE_LEN).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_rejections() {
        let err = UpstreamError::from_status("gemini", StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(
            err,
            UpstreamError::Rejected {
                provider: "gemini",
                status: 401,
                message: "bad key".to_string()
            }
        );
    }

    #[test]
    fn server_errors_are_failures() {
        let err = UpstreamError::from_status("ngumzo", StatusCode::BAD_GATEWAY, "down");
        assert!(matches!(
            err,
            UpstreamError::Failed {
                status: Some(502),
                ..
            }
        ));
        assert_eq!(err.provider(), "ngumzo");
    }

    #[test]
    fn extracts_nested_error_message() {
        let body = concat!(
            r#"{"error": {"code": 400, "message": "API key not valid","#,
            r#" "status": "INVALID_ARGUMENT"}}"#
        );
        assert_eq!(error_message(body), "API key not valid");
        assert_eq!(error_message(r#"{"error": "quota"}"#), "quota");
        assert_eq!(error_message(r#"{"message": "nope"}"#), "nope");
        assert_eq!(error_message("  plain text "), "plain text");
        assert_eq!(error_message(""), "empty response body");
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "x".repeat(500);
        let err = UpstreamError::from_status("gemini", StatusCode::BAD_REQUEST, &long);
        match err {
            UpstreamError::Rejected { message, .. } => {
                assert_eq!(message.chars().count(), MAX_MESSAGE_LEN + 3)
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
