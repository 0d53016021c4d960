//! Error types for the fetch controller.
//!
//! # Design
//! Failures keep only owned strings so a single error value can be handed to
//! the `on_fetch_error` hook, stored in state, broadcast to error subscribers
//! and returned from `execute` without sharing the transport's error type.
//! Cancellation has its own variant and is never reported through the error
//! state or channel.

/// Errors produced while executing a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The transport failed before a response was received.
    #[error("{0}")]
    Transport(String),

    /// The server answered with a status outside the 2xx range. Displays as
    /// the status text so it can serve as the default reported message.
    #[error("{status_text}")]
    Status { status: u16, status_text: String },

    /// The response body could not be decoded as the requested type.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The request payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The attempt was cancelled by `abort()` or by the timeout.
    #[error("request aborted")]
    Aborted,
}

impl FetchError {
    /// The message reported in state when no `on_fetch_error` hook replaces it.
    pub fn message(&self) -> String {
        match self {
            FetchError::Status { status, status_text } if status_text.is_empty() => {
                format!("HTTP {status}")
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_reports_status_text() {
        let err = FetchError::Status {
            status: 404,
            status_text: "Not Found".to_string(),
        };
        assert_eq!(err.message(), "Not Found");
    }

    #[test]
    fn status_error_without_text_falls_back_to_code() {
        let err = FetchError::Status {
            status: 599,
            status_text: String::new(),
        };
        assert_eq!(err.message(), "HTTP 599");
    }

    #[test]
    fn transport_error_reports_its_message() {
        let err = FetchError::Transport("connection refused".to_string());
        assert_eq!(err.message(), "connection refused");
    }
}
