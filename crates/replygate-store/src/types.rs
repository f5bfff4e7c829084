use serde::{Deserialize, Serialize};

/// One stored chat message as returned by [`HistoryStore::query_recent`].
///
/// Recalled (retracted) messages never appear here — the query itself
/// excludes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Platform-native sender id.
    pub sender_id: String,
    /// Display name, when the platform recorded one.
    pub sender_name: Option<String>,
    /// Plain text content.
    pub content: String,
}

impl HistoryMessage {
    /// Sender label with the display name → user id fallback applied.
    pub fn sender_label(&self) -> &str {
        match &self.sender_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.sender_id,
        }
    }
}

/// Channel metadata row: the persona association, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub conversation_key: String,
    pub persona_id: Option<i64>,
}

/// A configured persona (behavioral description) a channel can reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: i64,
    pub name: String,
    pub content: String,
}
