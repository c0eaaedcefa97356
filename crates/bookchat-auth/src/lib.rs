//! Session tokens and login for bookchat.
//!
//! This crate owns everything the client knows about "who is logged in":
//!
//! - A [`TokenStore`] abstraction over persistent client-side storage, with an
//!   in-memory and a file-backed implementation
//! - [`AuthSession`], the explicit session context handed to request clients,
//!   which reads the access token fresh on every call
//! - [`LoginNavigator`], the side effect fired when the backend rejects a session
//! - [`AuthClient`] for logging in and registering against the backend
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   ApiClient /    │────▶│   AuthSession    │
//! │   ChatSession    │     │  (token context) │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │   TokenStore     │
//!                          │   (trait)        │
//!                          └────────┬─────────┘
//!                       ┌───────────┴──────────┐
//!              ┌────────▼───────┐     ┌────────▼───────┐
//!              │ MemoryTokenStore│    │ FileTokenStore │
//!              └────────────────┘     └────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bookchat_auth::{AuthSession, MemoryTokenStore, TokenPair};
//!
//! let session = AuthSession::new(Arc::new(MemoryTokenStore::new()));
//! assert!(session.access_token().unwrap().is_none());
//!
//! session
//!     .store_tokens(&TokenPair::new("access", "refresh"))
//!     .unwrap();
//! assert_eq!(session.access_token().unwrap().as_deref(), Some("access"));
//!
//! session.clear().unwrap();
//! assert!(!session.is_logged_in());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod navigator;
pub mod session;
pub mod store;

pub use client::{AuthClient, RegisterRequest};
pub use error::{AuthError, Result};
pub use navigator::{LoginNavigator, NoopNavigator};
pub use session::{AuthSession, TokenPair, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};

#[cfg(any(test, feature = "test-utils"))]
pub use navigator::RecordingNavigator;

/// Configuration for the backend's authentication endpoints.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the backend API (e.g., `http://localhost:8000`).
    pub base_url: String,
}

impl AuthConfig {
    /// Create a configuration, trimming any trailing slash from the base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the login endpoint URL.
    #[must_use]
    pub fn login_url(&self) -> String {
        format!("{}/auth/login", self.base_url)
    }

    /// Get the registration endpoint URL.
    #[must_use]
    pub fn register_url(&self) -> String {
        format!("{}/auth/register", self.base_url)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new("http://localhost:8000")
    }
}
