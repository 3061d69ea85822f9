//! Server error types and their HTTP rendering.

use std::io;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use calbridge_core::DraftError;
use calbridge_providers::{ProviderError, ProviderErrorCode};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request body is missing fields or has invalid values.
    #[error("{0}")]
    MalformedRequest(String),

    /// No valid credentials could be obtained.
    #[error("credential acquisition failed: {0}")]
    Credentials(ProviderError),

    /// The calendar service failed after credentials were obtained.
    #[error("calendar service failed: {0}")]
    Upstream(ProviderError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// IO error (listener, files).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns the HTTP status and the `kind` tag for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::MalformedRequest(_) => (StatusCode::BAD_REQUEST, "malformed_request"),
            Self::Credentials(e) => match e.code() {
                ProviderErrorCode::AuthorizationDenied => {
                    (StatusCode::FORBIDDEN, "authorization_denied")
                }
                ProviderErrorCode::FlowTimeout => (StatusCode::GATEWAY_TIMEOUT, "flow_timeout"),
                _ => (StatusCode::BAD_GATEWAY, "credentials"),
            },
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            Self::Config { .. } | Self::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl From<DraftError> for ServerError {
    fn from(err: DraftError) -> Self {
        Self::MalformedRequest(err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status();

        let body = match &self {
            // Validation errors carry no kind.
            Self::MalformedRequest(message) => json!({ "error": message }),
            other => json!({ "error": other.to_string(), "kind": kind }),
        };

        if status.is_server_error() {
            error!(%status, kind, error = %self, "request failed");
        } else {
            warn!(%status, kind, error = %self, "request rejected");
        }

        (status, Json(body)).into_response()
    }
}
