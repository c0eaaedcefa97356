//! Conversation data model.
//!
//! The backend keeps a flat, role-tagged message log per book. The client
//! works with question/answer pairs, so the log is paired on load.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One committed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    /// The question as submitted.
    #[serde(alias = "q")]
    pub question: String,
    /// The answer text committed at finalize time.
    #[serde(alias = "a")]
    pub answer: String,
}

impl QaPair {
    /// Create a new pair.
    #[must_use]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Author of a message in the backend log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChatRole {
    /// A question typed by the reader.
    User,
    /// An answer produced by the backend.
    Assistant,
    /// A system prompt or note.
    System,
    /// Any role this client does not know about.
    Other(String),
}

impl ChatRole {
    /// Wire representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Other(role) => role,
        }
    }
}

impl From<String> for ChatRole {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            _ => Self::Other(value),
        }
    }
}

impl From<ChatRole> for String {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the backend chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Who wrote the message.
    pub role: ChatRole,
    /// Message text.
    #[serde(default)]
    pub content: String,
}

impl HistoryMessage {
    /// Create a new log entry.
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Response body of `GET /chat/history`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Messages in chronological order.
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

/// Pair a role-tagged log into question/answer exchanges.
///
/// Only a user message immediately followed by an assistant message forms a
/// pair. Anything else (a trailing unanswered question, consecutive user
/// messages, system notes) is skipped.
#[must_use]
pub fn pair_history(log: &[HistoryMessage]) -> Vec<QaPair> {
    let mut pairs = Vec::with_capacity(log.len() / 2);
    let mut i = 0;
    while i < log.len() {
        match (&log[i].role, log.get(i + 1).map(|next| &next.role)) {
            (ChatRole::User, Some(ChatRole::Assistant)) => {
                pairs.push(QaPair::new(&log[i].content, &log[i + 1].content));
                i += 2;
            }
            _ => i += 1,
        }
    }
    pairs
}
