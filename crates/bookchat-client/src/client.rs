//! The authenticated request client.

use std::sync::Arc;

use bookchat_auth::{AuthSession, LoginNavigator};
use bookchat_core::{BookId, HistoryResponse};
use reqwest::{Client, StatusCode, Url};
use serde::de::{DeserializeOwned, IgnoredAny};

use crate::error::{ClientError, Result};
use crate::headers::{merge_headers, normalize_headers};
use crate::request::{RequestBody, RequestOptions};
use crate::types::{Book, User};
use crate::ClientConfig;

/// Client for the backend REST API.
///
/// Cloning is cheap; clones share the connection pool, session and navigator.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: AuthSession,
    navigator: Arc<dyn LoginNavigator>,
}

impl ApiClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(
        config: &ClientConfig,
        session: AuthSession,
        navigator: Arc<dyn LoginNavigator>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self::with_client(client, config, session, navigator))
    }

    /// Create a new client with a custom reqwest client.
    #[must_use]
    pub fn with_client(
        client: Client,
        config: &ClientConfig,
        session: AuthSession,
        navigator: Arc<dyn LoginNavigator>,
    ) -> Self {
        Self {
            client,
            base_url: config.normalized_base_url(),
            session,
            navigator,
        }
    }

    /// Base URL of the backend.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The session tokens are read from.
    #[must_use]
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Resolve a request target against the base URL.
    ///
    /// Absolute `http(s)://` targets are used as is.
    #[must_use]
    pub fn resolve(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!("{}/{}", self.base_url, target.trim_start_matches('/'))
        }
    }

    /// Resolve `path` and append URL-encoded query parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the resolved target is not a valid URL.
    pub fn url_with_query(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let resolved = self.resolve(path);
        let mut url =
            Url::parse(&resolved).map_err(|e| ClientError::InvalidUrl(format!("{resolved}: {e}")))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// Send one authenticated request and parse the JSON response.
    ///
    /// An empty response body is parsed as JSON `null`, so `()`,
    /// `Option<T>` and [`IgnoredAny`] work for bodiless endpoints.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` on a 401, after clearing the session and firing the login redirect
    /// - `Http` on any other non-success status
    /// - `Transport` if the request cannot be sent or the body cannot be read
    /// - `Parse` if the body is not the expected JSON
    pub async fn request<T: DeserializeOwned>(
        &self,
        target: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let url = self.resolve(target);
        let RequestOptions {
            method,
            body,
            headers,
            omit_content_type,
        } = options;

        let token = self.session.access_token()?;
        let caller = normalize_headers(headers)?;
        let headers = merge_headers(
            token.as_deref(),
            body.is_form() || omit_content_type,
            &caller,
        )?;

        tracing::debug!(
            method = %method,
            url = %url,
            authenticated = token.is_some(),
            "Sending request"
        );

        let builder = self.client.request(method.clone(), &url).headers(headers);
        let builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(
                serde_json::to_vec(&value).map_err(|e| ClientError::Parse(e.to_string()))?,
            ),
            RequestBody::Text(text) => builder.body(text),
            RequestBody::Form(form) => builder.multipart(form),
        };

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(method = %method, url = %url, "Request unauthorized; ending session");
            self.expire_session();
            return Err(ClientError::Unauthorized);
        }

        if !status.is_success() {
            tracing::debug!(method = %method, url = %url, status = %status, "Request failed");
            return Err(ClientError::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let bytes = response.bytes().await?;
        let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &bytes
        };
        serde_json::from_slice(body).map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Clear the stored tokens and send the user to login.
    fn expire_session(&self) {
        if let Err(e) = self.session.clear() {
            tracing::warn!(error = %e, "Failed to clear session tokens");
        }
        self.navigator.redirect_to_login();
    }

    // =========================================================================
    // Chat History
    // =========================================================================

    /// Fetch the raw role-tagged chat log for a book.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn chat_history(&self, book_id: &BookId) -> Result<HistoryResponse> {
        let url = self.url_with_query("/chat/history", &[("book_id", book_id.as_str())])?;
        self.request(url.as_str(), RequestOptions::get()).await
    }

    /// Delete the chat log for a book.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn clear_chat_history(&self, book_id: &BookId) -> Result<()> {
        let url = self.url_with_query("/chat/history", &[("book_id", book_id.as_str())])?;
        let _: IgnoredAny = self.request(url.as_str(), RequestOptions::delete()).await?;
        Ok(())
    }

    // =========================================================================
    // Library
    // =========================================================================

    /// List the books visible to the current session.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn list_books(&self) -> Result<Vec<Book>> {
        self.request("/books", RequestOptions::get()).await
    }

    /// Fetch the logged-in account without touching the session on failure.
    ///
    /// A 401 still ends the session, as with every request.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn fetch_user(&self) -> Result<User> {
        self.request("/auth/me", RequestOptions::get()).await
    }

    /// Fetch the logged-in account.
    ///
    /// Any failure is treated as an invalid session: the stored tokens are
    /// cleared before the error is returned.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn current_user(&self) -> Result<User> {
        let result = self.fetch_user().await;
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "Fetching current user failed; clearing session");
            if let Err(clear_err) = self.session.clear() {
                tracing::warn!(error = %clear_err, "Failed to clear session tokens");
            }
        }
        result
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
