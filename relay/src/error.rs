//! Error types for the relay.
//!
//! Every failure while handling a request is converted into an HTTP response
//! at the handler boundary, with a JSON body of the form
//! `{"error": <kind>, "message": <detail>}`.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the relay.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Target URL not specified. Use X-Proxy-Target header or ?target= query param.")]
    MissingTarget,

    #[error("Invalid target URL {value:?}: {reason}")]
    InvalidTarget { value: String, reason: String },

    #[error("Upstream connection failed to {target}: {reason}")]
    UpstreamUnreachable { target: String, reason: String },

    #[error("Upstream {target} did not respond within {}s", .after.as_secs())]
    UpstreamTimeout { target: String, after: Duration },

    #[error("Upstream protocol error from {target}: {reason}")]
    UpstreamProtocol { target: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Relay bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal relay error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingTarget | RelayError::InvalidTarget { .. } => StatusCode::BAD_REQUEST,
            RelayError::UpstreamUnreachable { .. } | RelayError::UpstreamProtocol { .. } => {
                StatusCode::BAD_GATEWAY
            }
            RelayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Config(_)
            | RelayError::Bind { .. }
            | RelayError::Internal(_)
            | RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short, stable label for the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::MissingTarget => "Target not specified",
            RelayError::InvalidTarget { .. } => "Invalid target",
            RelayError::UpstreamUnreachable { .. } => "Proxy error",
            RelayError::UpstreamTimeout { .. } => "Upstream timeout",
            RelayError::UpstreamProtocol { .. } => "Upstream protocol error",
            RelayError::Config(_)
            | RelayError::Bind { .. }
            | RelayError::Internal(_)
            | RelayError::Io(_) => "Internal server error",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
