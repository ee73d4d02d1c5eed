//! Error types for alpha-dash

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for alpha-dash
pub type Result<T> = std::result::Result<T, Error>;

/// alpha-dash errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing credentials, bad URL, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object storage rejected or failed an operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Upstream unreachable or returned garbage
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request rejected before reaching the backend
    #[error("Validation error: {0}")]
    Validation(String),

    /// Analysis backend answered with a non-success status
    #[error("Backend failed ({status}): {message}")]
    Backend {
        /// HTTP status returned by the backend
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Operation did not finish in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Unknown job / file
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a backend error
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    /// HTTP status the dashboard answers with when this error reaches a
    /// write endpoint
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Backend { .. } | Self::Transport(_) | Self::Http(_) | Self::Storage(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
