//! Credential error types.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a [`PublishEndpoint`](super::PublishEndpoint).
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Transport-level failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The call did not finish within the session timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint rejected the cookie.
    #[error("Session expired: {0}")]
    AuthExpired(String),

    /// Non-OK response code.
    #[error("Endpoint returned code {code}: {message}")]
    Api { code: i64, message: String },

    /// Response could not be understood.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl EndpointError {
    #[inline]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired(_))
    }
}

/// Errors that can occur during credential operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Cookie string is not syntactically usable.
    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),

    /// Endpoint call failed.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// Refresh strategy could not produce a cookie.
    #[error("Refresh failed: {0}")]
    RefreshFailed(String),

    /// No live bot connection to source a cookie from.
    #[error("No bot connection available")]
    NoBotAvailable,

    /// QR code expired before it was confirmed.
    #[error("QR code expired")]
    QrExpired,

    /// QR code was not confirmed in time.
    #[error("QR login timed out after {polls} polls")]
    QrTimeout { polls: u32 },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CredentialError {
    /// Check if this error requires a manual login.
    pub fn requires_relogin(&self) -> bool {
        matches!(
            self,
            Self::InvalidCookie(_)
                | Self::QrExpired
                | Self::QrTimeout { .. }
                | Self::Endpoint(EndpointError::AuthExpired(_))
        )
    }

    /// Check if this error is transient and may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Endpoint(
                EndpointError::Network(_) | EndpointError::Timeout(_) | EndpointError::Parse(_)
            ) | Self::NoBotAvailable
        )
    }

    /// Whether the endpoint rejected the cookie.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Endpoint(e) if e.is_auth_expired())
    }
}
