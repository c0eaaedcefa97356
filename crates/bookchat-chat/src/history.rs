//! Non-streaming history calls used by a chat session.

use async_trait::async_trait;

use bookchat_client::{ApiClient, ClientError};
use bookchat_core::{BookId, HistoryMessage};

/// Backend operations on a book's persisted chat log.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// Fetch the flat, ordered, role-tagged log.
    async fn fetch_history(&self, book_id: &BookId) -> Result<Vec<HistoryMessage>, ClientError>;

    /// Delete the log.
    async fn clear_history(&self, book_id: &BookId) -> Result<(), ClientError>;
}

#[async_trait]
impl HistoryApi for ApiClient {
    async fn fetch_history(&self, book_id: &BookId) -> Result<Vec<HistoryMessage>, ClientError> {
        Ok(self.chat_history(book_id).await?.history)
    }

    async fn clear_history(&self, book_id: &BookId) -> Result<(), ClientError> {
        self.clear_chat_history(book_id).await
    }
}
