//! 会话记忆：会话键 -> Turn 序列（内存 / SQLite）

#[cfg(feature = "async-sqlite")]
pub mod sqlite;
pub mod store;

#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteSessionStore;
pub use store::{create_session_store, MemorySessionStore, SessionStore};
