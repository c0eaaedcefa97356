//! Core types and utilities for bookchat.
//!
//! This crate provides the foundational types used throughout the bookchat client:
//!
//! - **Identifiers**: Strongly-typed IDs for books and chat exchanges
//! - **Conversation model**: Question/answer pairs and the role-tagged backend log
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use bookchat_core::{pair_history, BookId, ChatRole, HistoryMessage};
//!
//! let book_id: BookId = "6650c1f2".parse().unwrap();
//!
//! let log = vec![
//!     HistoryMessage::new(ChatRole::User, "Who is the narrator?"),
//!     HistoryMessage::new(ChatRole::Assistant, "Ishmael."),
//! ];
//! let pairs = pair_history(&log);
//! assert_eq!(pairs[0].answer, "Ishmael.");
//! # let _ = book_id;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod conversation;
pub mod error;
pub mod ids;

pub use conversation::{pair_history, ChatRole, HistoryMessage, HistoryResponse, QaPair};
pub use error::{CoreError, Result};
pub use ids::{BookId, ExchangeId, IdError};
