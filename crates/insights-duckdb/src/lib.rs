pub mod backend;
pub mod schema;

pub use backend::DuckDbStateStore;

/// Re-export the `duckdb` crate so tests can inspect the table directly.
pub use duckdb;
