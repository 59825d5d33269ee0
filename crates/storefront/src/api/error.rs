//! Errors returned by the REST API client.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur when talking to the commerce API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Request path could not be joined onto the base URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Token persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// No valid credentials were presented.
    #[error("Unauthorized")]
    Unauthorized,

    /// The access token was rejected and could not be refreshed.
    #[error("Session expired, please sign in again")]
    SessionExpired,

    /// Authenticated, but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected by backend validation (400/422).
    #[error("Validation failed: {message}")]
    Validation {
        /// Summary message.
        message: String,
        /// Per-field messages.
        fields: BTreeMap<String, Vec<String>>,
    },

    /// State conflict (e.g., stock changed, coupon already applied).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Backend failure or unexpected status.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the response body, if any.
        message: String,
    },
}

impl ApiError {
    /// Whether the error means the customer is no longer signed in.
    #[must_use]
    pub const fn ends_session(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::SessionExpired)
    }

    /// Whether the backend refused the presented credentials outright.
    ///
    /// Used to tell a rejected refresh token apart from a transient failure.
    #[must_use]
    pub const fn is_credential_rejection(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::Forbidden(_) | Self::Validation { .. }
        )
    }

    /// Whether the failure is on the backend side or the network.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Parse(_) | Self::Server { .. } | Self::RateLimited(_)
        )
    }
}
