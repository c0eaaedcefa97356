//! Authenticated REST client for the bookchat backend.
//!
//! Every ordinary (non-streaming) backend call goes through [`ApiClient::request`],
//! which:
//!
//! 1. Reads the access token fresh from the [`AuthSession`](bookchat_auth::AuthSession)
//! 2. Normalizes caller headers from any supported shape ([`HeaderInput`])
//! 3. Merges `Authorization` < default `Content-Type` < caller headers
//! 4. Sends a single attempt, with no retries
//! 5. Tears the session down and redirects to login on `401`
//! 6. Maps other non-2xx statuses to [`ClientError::Http`]
//! 7. Parses the JSON body into the requested type
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bookchat_auth::{AuthSession, MemoryTokenStore, NoopNavigator};
//! use bookchat_client::{ApiClient, ClientConfig, RequestOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = AuthSession::new(Arc::new(MemoryTokenStore::new()));
//! let client = ApiClient::new(
//!     &ClientConfig::new("http://localhost:8000"),
//!     session,
//!     Arc::new(NoopNavigator),
//! )?;
//!
//! let books: serde_json::Value = client.request("/books", RequestOptions::get()).await?;
//! println!("{books}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod headers;
pub mod request;
pub mod types;

pub use client::ApiClient;
pub use error::{ClientError, Result};
pub use headers::{merge_headers, normalize_headers, HeaderInput};
pub use request::{RequestBody, RequestOptions};
pub use types::{Book, User};

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the REST client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend API (e.g., `http://localhost:8000`).
    #[serde(default = "ClientConfig::default_base_url")]
    pub base_url: String,

    /// Whole-request timeout in seconds.
    #[serde(default = "ClientConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// TCP connect timeout in seconds.
    #[serde(default = "ClientConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl ClientConfig {
    /// Create a configuration for `base_url` with default timeouts.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    fn default_base_url() -> String {
        "http://localhost:8000".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            request_timeout_seconds: Self::default_request_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
        }
    }
}
