//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while managing the client session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token store could not be read or written.
    #[error("token storage error: {0}")]
    Storage(String),

    /// The backend rejected the login or registration.
    #[error("authentication rejected: {0}")]
    Rejected(String),

    /// The HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an unexpected body.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
