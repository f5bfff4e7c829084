use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::debug;

use replygate_core::types::ConversationKey;

use crate::db::init_db;
use crate::error::StoreError;
use crate::traits::{ChannelStore, HistoryStore, KvStore};
use crate::types::{ChannelRecord, HistoryMessage, Persona};

/// SQLite-backed reference implementation of all three storage traits.
///
/// Wraps a single connection in a `Mutex`. The lock is only held for
/// synchronous statement execution and row mapping — never across an await
/// point. For high-concurrency deployments consider a connection pool, but
/// a Mutex is sufficient for a single-node host.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self, StoreError> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) a database file and initialise the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::new(Connection::open(path)?)
    }

    /// In-memory store, mainly for tests and ephemeral hosts.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Append a chat message row. Returns the new row id.
    pub fn record_message(
        &self,
        key: &ConversationKey,
        sender_id: &str,
        sender_name: Option<&str>,
        content: &str,
    ) -> Result<i64, StoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO chat_messages
             (conversation_key, sender_id, sender_name, content, recalled, sent_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            rusqlite::params![key.as_str(), sender_id, sender_name, content, now],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Mark a message as recalled; it disappears from `query_recent`.
    pub fn recall_message(&self, message_id: i64) -> Result<(), StoreError> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE chat_messages SET recalled = 1 WHERE id = ?1",
            rusqlite::params![message_id],
        )?;
        Ok(())
    }

    /// Create a persona definition. Returns its id.
    pub fn insert_persona(&self, name: &str, content: &str) -> Result<i64, StoreError> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO personas (name, content) VALUES (?1, ?2)",
            rusqlite::params![name, content],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Associate (or clear) a conversation's persona.
    ///
    /// Fails when `persona_id` points at no persona row, so a channel can
    /// never reference a persona that does not exist.
    pub fn assign_persona(
        &self,
        key: &ConversationKey,
        persona_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let db = self.db.lock().unwrap();
        if let Some(id) = persona_id {
            let exists: bool = db
                .query_row(
                    "SELECT 1 FROM personas WHERE id = ?1",
                    rusqlite::params![id],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !exists {
                return Err(StoreError::PersonaNotFound { id });
            }
        }
        db.execute(
            "INSERT INTO chat_channels (conversation_key, persona_id)
             VALUES (?1, ?2)
             ON CONFLICT(conversation_key) DO UPDATE SET persona_id = ?2",
            rusqlite::params![key.as_str(), persona_id],
        )?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn query_recent(
        &self,
        key: &ConversationKey,
        limit: u32,
    ) -> Result<Vec<HistoryMessage>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT sender_id, sender_name, content
             FROM chat_messages
             WHERE conversation_key = ?1 AND recalled = 0
             ORDER BY sent_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![key.as_str(), limit], |row| {
            Ok(HistoryMessage {
                sender_id: row.get(0)?,
                sender_name: row.get(1)?,
                content: row.get(2)?,
            })
        })?;
        let msgs: Vec<_> = rows.filter_map(|r| r.ok()).collect();
        debug!(key = %key, count = msgs.len(), "history query");
        Ok(msgs)
    }
}

#[async_trait]
impl ChannelStore for SqliteStore {
    async fn get_channel(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT conversation_key, persona_id FROM chat_channels
             WHERE conversation_key = ?1",
            rusqlite::params![key.as_str()],
            |row| {
                Ok(ChannelRecord {
                    conversation_key: row.get(0)?,
                    persona_id: row.get(1)?,
                })
            },
        ) {
            Ok(rec) => Ok(Some(rec)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get_persona(&self, id: i64) -> Result<Option<Persona>, StoreError> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, name, content FROM personas WHERE id = ?1",
            rusqlite::params![id],
            |row| {
                Ok(Persona {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    content: row.get(2)?,
                })
            },
        ) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT value FROM plugin_store WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get::<_, String>(0),
        ) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO plugin_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, now],
        )?;
        Ok(())
    }
}
