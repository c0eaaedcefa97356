//! Login and registration against the backend's auth endpoints.
//!
//! These calls go out without a bearer token, so they use a plain HTTP client
//! rather than the authenticated request wrapper.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::session::{AuthSession, TokenPair};
use crate::AuthConfig;

/// Fallback message when the backend gives no reason for a rejection.
const DEFAULT_REJECTION: &str = "Authentication failed";

/// Request payload for email/password login.
#[derive(Debug, Clone, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Request payload for creating an account.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    /// Account email address.
    pub email: String,
    /// Public username.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Optional display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Error body returned by the backend on a rejected request.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// Client for the backend's login and registration endpoints.
pub struct AuthClient {
    config: AuthConfig,
    session: AuthSession,
    client: reqwest::Client,
}

impl AuthClient {
    /// Create a new auth client that stores issued tokens in `session`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should never happen with default TLS).
    #[must_use]
    pub fn new(config: AuthConfig, session: AuthSession) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to create HTTP client");

        Self::with_client(client, config, session)
    }

    /// Create a new auth client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: AuthConfig, session: AuthSession) -> Self {
        Self {
            config,
            session,
            client,
        }
    }

    /// Authenticate with email and password and persist the issued tokens.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` with the backend's reason if the credentials are
    /// refused, `InvalidResponse` if the success body lacks tokens, or a
    /// transport/storage error.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair> {
        let url = self.config.login_url();

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let tokens: TokenPair = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        if tokens.access_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "login response carried no access token".to_string(),
            ));
        }

        self.session.store_tokens(&tokens)?;
        tracing::info!(email, "Logged in");
        Ok(tokens)
    }

    /// Create a new account. No tokens are issued; the caller logs in afterwards.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` with the backend's reason if registration is refused,
    /// or a transport error.
    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let url = self.config.register_url();

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        tracing::info!(email = %request.email, "Registered account");
        Ok(())
    }

    /// Forget the stored tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the token store cannot be written.
    pub fn logout(&self) -> Result<()> {
        self.session.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// The session this client writes tokens into.
    #[must_use]
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Convert a non-success response into `AuthError::Rejected`.
    async fn rejection(response: reqwest::Response) -> AuthError {
        let status = response.status();
        let reason = response
            .json::<ErrorResponse>()
            .await
            .ok()
            .and_then(|body| body.detail)
            .map_or_else(|| DEFAULT_REJECTION.to_string(), |detail| match detail {
                serde_json::Value::String(message) => message,
                other => other.to_string(),
            });

        tracing::warn!(status = %status, reason = %reason, "Authentication request rejected");
        AuthError::Rejected(reason)
    }
}
