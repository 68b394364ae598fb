use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use insights_state::StateStore;

use crate::schema::{init_sql, MIGRATIONS_TABLE_SQL, SCHEMA_VERSION};

/// [`StateStore`] on an embedded DuckDB file.
///
/// DuckDB is single-writer, so the connection sits behind `Arc<Mutex<_>>`.
/// Actor flushes are already batched by the aggregators; one writer at a time
/// is enough.
#[derive(Clone)]
pub struct DuckDbStateStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbStateStore {
    /// Open (or create) a DuckDB database file at `path` and ensure the
    /// `actor_state` table exists.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn, memory_limit)?;
        info!(path, memory_limit, "DuckDB state store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Data is discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn, "1GB")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection, memory_limit: &str) -> Result<()> {
        conn.execute_batch(MIGRATIONS_TABLE_SQL)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        conn.execute(
            "INSERT OR IGNORE INTO _migrations (id) VALUES (?1)",
            duckdb::params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Number of rows stored for `kind`.
    pub async fn count(&self, kind: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM actor_state WHERE kind = ?1")?;
        let count: i64 = stmt.query_row(duckdb::params![kind], |row| row.get(0))?;
        Ok(count)
    }

    /// Direct connection access for integration tests that inspect tables.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

#[async_trait]
impl StateStore for DuckDbStateStore {
    async fn load(&self, kind: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT payload FROM actor_state WHERE kind = ?1 AND key = ?2")?;
        match stmt.query_row(duckdb::params![kind, key], |row| row.get::<_, Vec<u8>>(0)) {
            Ok(payload) => Ok(Some(payload)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow::anyhow!(e)),
        }
    }

    async fn save(&self, kind: &str, key: &str, payload: &[u8]) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO actor_state (kind, key, payload, updated_at)
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
             ON CONFLICT (kind, key) DO UPDATE
             SET payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at",
            duckdb::params![kind, key, payload],
        )?;
        Ok(())
    }

    async fn clear(&self, kind: &str, key: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM actor_state WHERE kind = ?1 AND key = ?2",
            duckdb::params![kind, key],
        )?;
        Ok(())
    }
}
