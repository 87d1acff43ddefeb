//! Database pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows one writer at a time, so writes go through a
//! single-connection pool while queries share a small reader pool.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::filesystem::resolve_data_dir;

/// Maximum concurrent reader connections.
const READER_CONNECTIONS: u32 = 8;

/// Split read/write pool for SQLite with WAL mode.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open both pools and run pending migrations on the writer.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let read_opts = base_opts.clone().read_only(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(base_opts)
            .await?;

        // Migrations must land before readers open against the file.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(read_opts)
            .await?;

        tracing::debug!(url = database_url, "database pool ready");
        Ok(Self { reader, writer })
    }
}

/// `sqlite://{data_dir}/memoria.db`, with the data dir from [`resolve_data_dir`].
pub fn default_database_url() -> String {
    let path = resolve_data_dir().join("memoria.db");
    format!("sqlite://{}", path.display())
}
