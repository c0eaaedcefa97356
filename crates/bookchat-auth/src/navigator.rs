//! Side effect fired when the backend reports an expired session.

#[cfg(any(test, feature = "test-utils"))]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sends the user back to the login entry point.
///
/// Called by the request client after a 401, once per rejected request.
pub trait LoginNavigator: Send + Sync {
    /// Navigate to the login entry point.
    fn redirect_to_login(&self);
}

/// Navigator that only logs the redirect.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl LoginNavigator for NoopNavigator {
    fn redirect_to_login(&self) {
        tracing::info!("Session expired; login required");
    }
}

/// A navigator that counts redirects, for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingNavigator {
    /// Create a navigator with a zero count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of redirects observed so far.
    #[must_use]
    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl LoginNavigator for RecordingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}
