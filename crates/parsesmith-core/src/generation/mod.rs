//! Generation client seam.
//!
//! A [`GenerationClient`] turns one prompt into raw completion text. Clients
//! never retry internally; they classify failures as transient or persistent
//! and leave the retry decision to the controller.

pub mod gemini;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gemini::{GeminiClient, GeminiConfig};

/// Failure class of a generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Expected to succeed on an immediate retry (timeout, rate limit, 5xx).
    Transient,
    /// Will not improve by repeating the same request.
    Persistent,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Persistent => write!(f, "persistent"),
        }
    }
}

/// A failed generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct GenerationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn persistent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Persistent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Classify an HTTP status returned by a generation backend.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        408 | 429 | 500 | 502 | 503 | 504 => ErrorKind::Transient,
        _ => ErrorKind::Persistent,
    }
}

/// Sends a prompt to a generative model and returns the raw completion.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_gateway_errors_are_transient() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert_eq!(classify_status(status), ErrorKind::Transient, "{status}");
        }
    }

    #[test]
    fn client_errors_are_persistent() {
        for status in [400, 401, 403, 404, 501] {
            assert_eq!(classify_status(status), ErrorKind::Persistent, "{status}");
        }
    }

    #[test]
    fn error_display_names_kind() {
        let err = GenerationError::transient("rate limited");
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "transient error: rate limited");
    }
}
