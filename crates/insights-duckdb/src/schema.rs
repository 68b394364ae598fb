/// Identifier recorded in `_migrations` once [`init_sql`] has run.
pub const SCHEMA_VERSION: &str = "0001_actor_state";

/// DuckDB initialization SQL.
///
/// Executed once at open time via `Connection::execute_batch`. Every
/// statement is `IF NOT EXISTS`, so re-running on startup is safe.
///
/// Always set an explicit memory limit: DuckDB otherwise claims 80% of system
/// RAM. `memory_limit` is any DuckDB size string (`"512MB"`, `"1GB"`).
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- One opaque JSON blob per actor activation key.
CREATE TABLE IF NOT EXISTS actor_state (
    kind            VARCHAR NOT NULL,              -- actor type, e.g. 'hourly_metrics'
    key             VARCHAR NOT NULL,              -- composite key, e.g. 'metrics-hourly-site-2026021014'
    payload         BLOB NOT NULL,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (kind, key)
);
"#
    )
}

pub const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    id          VARCHAR PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;
