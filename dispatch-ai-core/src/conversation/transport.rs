use async_trait::async_trait;

use crate::conversation::types::{MessageHandle, Turn};
use crate::error::Result;

/// Chat-platform client seen from the core.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Most recent `limit` turns, oldest first.
    async fn fetch_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>>;

    async fn send(&self, conversation_id: &str, text: &str) -> Result<MessageHandle>;

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<()>;
}
