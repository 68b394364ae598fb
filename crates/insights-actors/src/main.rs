use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use insights_actors::ingest::{process_event, CollectRequest};
use insights_actors::Runtime;
use insights_core::clock::SystemClock;
use insights_core::config::{Config, StoreKind};
use insights_state::{MemoryStateStore, StateStore};

/// Upper bound on flushing every live actor at exit.
const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

fn open_store(cfg: &Config) -> Result<Arc<dyn StateStore>> {
    match cfg.store {
        StoreKind::DuckDb => {
            std::fs::create_dir_all(&cfg.data_dir)?;
            let path = format!("{}/insights.db", cfg.data_dir);
            let store = insights_duckdb::DuckDbStateStore::open(&path, &cfg.duckdb_memory_limit)?;
            Ok(Arc::new(store))
        }
        StoreKind::Memory => {
            warn!("using in-memory state store; nothing survives a restart");
            Ok(Arc::new(MemoryStateStore::new()))
        }
    }
}

/// Apply newline-delimited collect requests from stdin until EOF.
async fn ingest_stdin(runtime: &Runtime) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut applied = 0u64;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: CollectRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "skipping malformed collect request");
                continue;
            }
        };
        match process_event(runtime, request).await {
            Ok(()) => applied += 1,
            Err(e) => warn!(error = %e, "collect request failed"),
        }
    }
    info!(applied, "input exhausted");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("insights=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let store = open_store(&cfg)?;
    let runtime = Runtime::new(store, Arc::new(SystemClock), cfg);
    info!("actor runtime started");

    tokio::select! {
        result = ingest_stdin(&runtime) => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    if tokio::time::timeout(
        std::time::Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        runtime.shutdown(),
    )
    .await
    .is_err()
    {
        warn!("shutdown timed out; some buffered state was not flushed");
    }
    Ok(())
}
