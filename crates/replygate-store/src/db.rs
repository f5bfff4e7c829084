use rusqlite::{Connection, Result};

/// Initialise storage tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_chat_messages_table(conn)?;
    create_chat_channels_table(conn)?;
    create_personas_table(conn)?;
    create_plugin_store_table(conn)?;
    Ok(())
}

fn create_chat_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_messages (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_key TEXT NOT NULL,
            sender_id        TEXT NOT NULL,
            sender_name      TEXT,
            content          TEXT NOT NULL,
            recalled         INTEGER NOT NULL DEFAULT 0,
            sent_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON chat_messages(conversation_key, sent_at DESC);",
    )
}

/// Channel metadata — one row per conversation, persona link optional.
fn create_chat_channels_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_channels (
            conversation_key TEXT PRIMARY KEY,
            persona_id       INTEGER
        );",
    )
}

fn create_personas_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS personas (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            name    TEXT NOT NULL,
            content TEXT NOT NULL
        );",
    )
}

/// Generic key-value rows. The decision cache lives here under the
/// `ai_decision_` key prefix; other plugin state may share the table.
fn create_plugin_store_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS plugin_store (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
}
