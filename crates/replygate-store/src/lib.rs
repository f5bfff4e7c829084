pub mod db;
pub mod error;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use error::StoreError;
pub use sqlite::SqliteStore;
pub use traits::{ChannelStore, HistoryStore, KvStore};
pub use types::{ChannelRecord, HistoryMessage, Persona};
