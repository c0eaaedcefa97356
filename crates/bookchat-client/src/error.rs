//! Error types for the REST client.

use thiserror::Error;

/// A result type using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned by [`ApiClient`](crate::ApiClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend answered 401. The session has been torn down and the
    /// login redirect has already fired.
    #[error("unauthorized: redirecting to login")]
    Unauthorized,

    /// The backend answered with any other non-success status.
    #[error("HTTP {status}: {status_text}")]
    Http {
        /// Numeric status code.
        status: u16,
        /// Canonical reason phrase for the status.
        status_text: String,
    },

    /// The request could not be sent or the body could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A header name or value supplied by the caller is invalid.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The request target could not be turned into a URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The response body was not the expected JSON.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The session token could not be read or cleared.
    #[error("session error: {0}")]
    Session(#[from] bookchat_auth::AuthError),
}

impl ClientError {
    /// HTTP status associated with this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
