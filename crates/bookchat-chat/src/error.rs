//! Error types for chat sessions.
//!
//! Stream failures are not errors: an exchange always resolves to a
//! finalized (possibly partial) answer. These variants cover misuse and
//! the non-streaming history calls.

use thiserror::Error;

/// A result type using `ChatError`.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors that can occur in chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The question was empty or whitespace.
    #[error("question must not be empty")]
    EmptyQuestion,

    /// Another exchange is still streaming or draining.
    #[error("an exchange is already in progress")]
    ExchangeActive,

    /// A history call failed.
    #[error(transparent)]
    Client(#[from] bookchat_client::ClientError),

    /// The session token could not be read.
    #[error("session error: {0}")]
    Session(#[from] bookchat_auth::AuthError),

    /// The event stream could not be opened.
    #[error("stream transport error: {0}")]
    Transport(String),

    /// The exchange task ended without committing an answer.
    #[error("exchange task failed: {0}")]
    TaskFailed(String),
}
