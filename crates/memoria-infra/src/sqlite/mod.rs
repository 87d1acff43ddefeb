//! SQLite storage layer.
//!
//! Record store backed by SQLite with WAL mode, split read/write pools,
//! and an FTS5 index over record content.

pub mod memory_store;
pub mod pool;

pub use memory_store::SqliteMemoryStore;
pub use pool::{DatabasePool, default_database_url};
