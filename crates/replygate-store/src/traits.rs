//! Collaborator storage interfaces consumed by the gating core.
//!
//! The judge and filter crates depend only on these traits; hosts supply
//! their own implementations or reuse [`crate::SqliteStore`]. Keeping the
//! seams this narrow lets the core stay ignorant of where chat history
//! actually lives.

use async_trait::async_trait;

use replygate_core::types::ConversationKey;

use crate::error::StoreError;
use crate::types::{ChannelRecord, HistoryMessage, Persona};

/// Read access to stored chat history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Up to `limit` most-recent non-recalled messages for a conversation,
    /// newest first.
    async fn query_recent(
        &self,
        key: &ConversationKey,
        limit: u32,
    ) -> Result<Vec<HistoryMessage>, StoreError>;
}

/// Read access to channel metadata and persona definitions.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Channel row for a conversation, `None` when the channel is unknown.
    async fn get_channel(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<ChannelRecord>, StoreError>;

    /// Persona by id, `None` when it does not exist.
    async fn get_persona(&self, id: i64) -> Result<Option<Persona>, StoreError>;
}

/// Minimal persistent key-value store used by the decision cache.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditional overwrite (last write wins).
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
