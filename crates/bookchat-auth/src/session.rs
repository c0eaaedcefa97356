//! The explicit session context shared by every request path.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::TokenStore;

/// Storage key holding the bearer access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Tokens issued by a successful login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Bearer token attached to API requests.
    pub access_token: String,
    /// Refresh token. Stored but not consumed by this client.
    #[serde(default)]
    pub refresh_token: String,
}

impl TokenPair {
    /// Create a new token pair.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Session context: the one place tokens are read from and written to.
///
/// Cloning is cheap; clones share the same store.
#[derive(Clone)]
pub struct AuthSession {
    store: Arc<dyn TokenStore>,
}

impl AuthSession {
    /// Create a session backed by the given store.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Read the current access token. Absence means anonymous requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn access_token(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(ACCESS_TOKEN_KEY)?
            .filter(|token| !token.is_empty()))
    }

    /// Read the current refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn refresh_token(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(REFRESH_TOKEN_KEY)?
            .filter(|token| !token.is_empty()))
    }

    /// Whether an access token is currently stored.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        matches!(self.access_token(), Ok(Some(_)))
    }

    /// Persist a freshly issued token pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn store_tokens(&self, tokens: &TokenPair) -> Result<()> {
        self.store.set(ACCESS_TOKEN_KEY, &tokens.access_token)?;
        self.store.set(REFRESH_TOKEN_KEY, &tokens.refresh_token)?;
        tracing::debug!("Session tokens stored");
        Ok(())
    }

    /// Remove both tokens. Used by logout and by session-expiry teardown.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(ACCESS_TOKEN_KEY)?;
        self.store.remove(REFRESH_TOKEN_KEY)?;
        tracing::debug!("Session tokens cleared");
        Ok(())
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("logged_in", &self.is_logged_in())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;

    #[test]
    fn token_read_fresh_from_store() {
        let store = Arc::new(MemoryTokenStore::new());
        let session = AuthSession::new(store.clone());
        assert_eq!(session.access_token().unwrap(), None);

        store.set(ACCESS_TOKEN_KEY, "late-token").unwrap();
        assert_eq!(
            session.access_token().unwrap().as_deref(),
            Some("late-token")
        );
    }

    #[test]
    fn empty_token_counts_as_absent() {
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS_TOKEN_KEY, "")]));
        let session = AuthSession::new(store);
        assert_eq!(session.access_token().unwrap(), None);
        assert!(!session.is_logged_in());
    }

    #[test]
    fn clear_removes_both_tokens() {
        let session = AuthSession::new(Arc::new(MemoryTokenStore::new()));
        session.store_tokens(&TokenPair::new("a", "r")).unwrap();
        assert_eq!(session.refresh_token().unwrap().as_deref(), Some("r"));

        session.clear().unwrap();
        assert_eq!(session.access_token().unwrap(), None);
        assert_eq!(session.refresh_token().unwrap(), None);
    }

    #[test]
    fn token_pair_debug_is_redacted() {
        let debug = format!("{:?}", TokenPair::new("secret-a", "secret-r"));
        assert!(!debug.contains("secret"));
    }
}
