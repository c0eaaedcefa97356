//! One-shot guard for committing an exchange.

use std::sync::atomic::{AtomicBool, Ordering};

/// Lets exactly one of several completion paths finalize an exchange.
///
/// Completion drain, stream error and timeout can all try to finalize the
/// same exchange; only the first `try_claim` returns `true`.
#[derive(Debug, Default)]
pub struct FinalizeGuard {
    claimed: AtomicBool,
}

impl FinalizeGuard {
    /// Create an unclaimed guard.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
        }
    }

    /// Claim the guard. Returns `true` only for the first caller.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the guard has been claimed.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}
