//! Terminal stand-in for the login redirect.

use std::sync::atomic::{AtomicBool, Ordering};

use bookchat_auth::LoginNavigator;

/// Tells the user to log in again when the backend rejects the session.
///
/// The notice is printed once per process, however many calls fail.
#[derive(Debug, Default)]
pub struct CliNavigator {
    notified: AtomicBool,
}

impl CliNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the notice has been shown.
    pub fn notified(&self) -> bool {
        self.notified.load(Ordering::Acquire)
    }
}

impl LoginNavigator for CliNavigator {
    fn redirect_to_login(&self) {
        if !self.notified.swap(true, Ordering::AcqRel) {
            eprintln!("Session expired. Run `bookchat login` to sign in again.");
        }
    }
}
