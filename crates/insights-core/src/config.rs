use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub store: StoreKind,
    pub duckdb_memory_limit: String,
    pub hourly_flush_interval_ms: u64,
    pub funnel_flush_interval_ms: u64,
    pub actor_idle_timeout_secs: u64,
    pub realtime_sweep_interval_secs: u64,
    pub realtime_idle_secs: u64,
}

/// Which durable backend holds actor state.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreKind {
    DuckDb,
    /// Process-local only; everything is lost on restart.
    Memory,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            data_dir: std::env::var("INSIGHTS_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            store: {
                let raw = std::env::var("INSIGHTS_STORE").unwrap_or_else(|_| "duckdb".to_string());
                match raw.as_str() {
                    "duckdb" => StoreKind::DuckDb,
                    "memory" => StoreKind::Memory,
                    other => return Err(format!("invalid INSIGHTS_STORE: {other}")),
                }
            },
            duckdb_memory_limit: std::env::var("INSIGHTS_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            hourly_flush_interval_ms: env_positive("INSIGHTS_HOURLY_FLUSH_MS", 5_000)?,
            funnel_flush_interval_ms: env_positive("INSIGHTS_FUNNEL_FLUSH_MS", 10_000)?,
            actor_idle_timeout_secs: env_positive("INSIGHTS_ACTOR_IDLE_SECS", 900)?,
            realtime_sweep_interval_secs: env_positive("INSIGHTS_REALTIME_SWEEP_SECS", 60)?,
            realtime_idle_secs: env_positive("INSIGHTS_REALTIME_IDLE_SECS", 300)?,
        })
    }

    pub fn hourly_flush_interval(&self) -> Duration {
        Duration::from_millis(self.hourly_flush_interval_ms)
    }

    pub fn funnel_flush_interval(&self) -> Duration {
        Duration::from_millis(self.funnel_flush_interval_ms)
    }

    pub fn actor_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.actor_idle_timeout_secs)
    }

    pub fn realtime_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.realtime_sweep_interval_secs)
    }

    /// Presence entries older than this are evicted by the shard sweep.
    /// Saturates at the largest representable duration.
    pub fn realtime_idle_cutoff(&self) -> chrono::Duration {
        i64::try_from(self.realtime_idle_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// Intervals and timeouts: unset falls back to `default`, zero is refused.
fn env_positive(name: &str, default: u64) -> Result<u64, String> {
    match std::env::var(name) {
        Ok(raw) => parse_positive(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u64, String> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(format!("{name} must be greater than zero")),
        Ok(value) => Ok(value),
        Err(e) => Err(format!("invalid {name}: {e}")),
    }
}
