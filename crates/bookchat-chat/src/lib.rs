//! Streaming question/answer sessions over server-sent events.
//!
//! A [`ChatSession`] runs one exchange at a time for a single book:
//!
//! ```text
//!  ask() ──▶ Streaming ──done──▶ Draining ──buffer empty──▶ Finalized ──hold──▶ Idle
//!               │                                              ▲
//!               └──────── error / stream end / timeout ────────┘
//! ```
//!
//! Fragments pushed by the server land in a FIFO buffer; a fixed-cadence
//! pacer reveals them one character per tick, independent of network
//! burstiness. A normal completion drains the buffer before committing; an
//! error or the timeout commits only what has already been revealed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bookchat_auth::{AuthSession, MemoryTokenStore, NoopNavigator};
//! use bookchat_chat::{ChatConfig, ChatSession, ExchangeUpdate};
//! use bookchat_client::{ApiClient, ClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = AuthSession::new(Arc::new(MemoryTokenStore::new()));
//! let api = ApiClient::new(
//!     &ClientConfig::new("http://localhost:8000"),
//!     session,
//!     Arc::new(NoopNavigator),
//! )?;
//!
//! let chat = ChatSession::connect("book-1".parse()?, ChatConfig::default(), &api)?;
//! chat.load_history().await?;
//!
//! let mut exchange = chat.ask("Who is the narrator?")?;
//! while let Some(update) = exchange.next_update().await {
//!     if let ExchangeUpdate::Partial(text) = update {
//!         println!("{text}");
//!     }
//! }
//! let outcome = exchange.finish().await?;
//! println!("{:?}: {}", outcome.reason, outcome.entry.answer);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod guard;
pub mod history;
pub mod pacer;
pub mod session;
pub mod sse;
pub mod transport;

pub use error::{ChatError, Result};
pub use guard::FinalizeGuard;
pub use history::HistoryApi;
pub use pacer::RevealBuffer;
pub use session::{
    ChatSession, Exchange, ExchangeOutcome, ExchangeState, ExchangeUpdate, FinishReason,
};
pub use sse::{SseEvent, SseParser};
pub use transport::{ChatTransport, EventStream, SseTransport, StreamEvent, StreamRequest};

use std::time::Duration;

use serde::Deserialize;

/// Timing configuration for chat exchanges.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Interval between revealed characters, in milliseconds.
    #[serde(default = "ChatConfig::default_reveal_tick")]
    pub reveal_tick_ms: u64,

    /// Ceiling on one exchange, measured from submission, in seconds.
    #[serde(default = "ChatConfig::default_timeout")]
    pub timeout_seconds: u64,

    /// How long the finished answer stays in the transient slot, in milliseconds.
    #[serde(default = "ChatConfig::default_display_hold")]
    pub display_hold_ms: u64,

    /// Connect timeout for the event stream, in seconds.
    #[serde(default = "ChatConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl ChatConfig {
    const fn default_reveal_tick() -> u64 {
        10
    }

    const fn default_timeout() -> u64 {
        30
    }

    const fn default_display_hold() -> u64 {
        100
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    /// Get the reveal tick as a `Duration`. Never zero.
    #[must_use]
    pub fn reveal_tick(&self) -> Duration {
        Duration::from_millis(self.reveal_tick_ms.max(1))
    }

    /// Get the exchange timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Get the display hold as a `Duration`.
    #[must_use]
    pub fn display_hold(&self) -> Duration {
        Duration::from_millis(self.display_hold_ms)
    }

    /// Get the stream connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reveal_tick_ms: Self::default_reveal_tick(),
            timeout_seconds: Self::default_timeout(),
            display_hold_ms: Self::default_display_hold(),
            connect_timeout_seconds: Self::default_connect_timeout(),
        }
    }
}
