use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("persona not found: {id}")]
    PersonaNotFound { id: i64 },

    #[error("serialization error: {0}")]
    Serialization(String),
}
