use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use insights_core::keys::parse_hourly_metrics;
use insights_core::metrics::{HourlyBuffer, HourlyMetrics, HourlyMetricsState};

use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

/// Buffered counters for one `metrics-hourly-{app}-{yyyyMMddHH}` bucket.
///
/// Increments accumulate in memory and are merged into durable state by the
/// flush timer and on deactivation. Conversions skip the buffer.
pub struct HourlyMetricsActor {
    key: String,
    state: PersistentState<HourlyMetricsState>,
    buffer: HourlyBuffer,
    /// Merged into `state` but not yet durably written.
    dirty: bool,
    flush_interval: Duration,
}

#[async_trait]
impl Actor for HourlyMetricsActor {
    const KIND: &'static str = "hourly_metrics";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let mut state = PersistentState::<HourlyMetricsState>::load(&ctx, Self::KIND).await?;
        if state.application_id.is_empty() {
            let parsed = parse_hourly_metrics(ctx.key());
            state.application_id = parsed.application_id;
            state.hour_start = parsed.hour_start;
        }
        Ok(Self {
            key: ctx.key().to_string(),
            state,
            buffer: HourlyBuffer::default(),
            dirty: false,
            flush_interval: ctx.config().hourly_flush_interval(),
        })
    }

    fn timer_period(&self) -> Option<Duration> {
        Some(self.flush_interval)
    }

    async fn on_timer(&mut self) -> anyhow::Result<()> {
        self.flush().await
    }

    async fn on_deactivate(&mut self) -> anyhow::Result<()> {
        self.flush().await
    }
}

impl HourlyMetricsActor {
    /// Merge the buffer into durable state and write it.
    ///
    /// The buffer is folded in before writing. If the write fails the merged
    /// state stays dirty and the next flush writes it again.
    pub async fn flush(&mut self) -> anyhow::Result<()> {
        if !self.buffer.is_empty() {
            let buffer = std::mem::take(&mut self.buffer);
            self.state.apply(&buffer);
            self.dirty = true;
        }
        if !self.dirty {
            return Ok(());
        }
        match self.state.write().await {
            Ok(()) => {
                self.dirty = false;
                debug!(key = %self.key, page_views = self.state.page_views, "hourly metrics flushed");
                Ok(())
            }
            Err(e) => {
                error!(key = %self.key, error = %e, "hourly metrics flush failed");
                Err(e)
            }
        }
    }

    async fn increment_conversions(
        &mut self,
        goal_id: String,
        value: Option<f64>,
    ) -> anyhow::Result<()> {
        self.state.record_conversion(&goal_id, value);
        self.dirty = true;
        self.state.write().await?;
        self.dirty = false;
        Ok(())
    }
}

impl ActorRef<HourlyMetricsActor> {
    pub async fn increment_page_views(&self) -> anyhow::Result<()> {
        self.apply(|m| m.buffer.page_views += 1).await
    }

    pub async fn increment_sessions(&self) -> anyhow::Result<()> {
        self.apply(|m| m.buffer.sessions += 1).await
    }

    pub async fn increment_unique_visitors(&self, visitor_id: &str) -> anyhow::Result<()> {
        let visitor_id = visitor_id.to_string();
        self.apply(move |m| {
            m.buffer.visitors.insert(visitor_id);
        })
        .await
    }

    pub async fn increment_events(&self, category: &str) -> anyhow::Result<()> {
        let category = category.to_string();
        self.apply(move |m| {
            m.buffer.events += 1;
            *m.buffer.events_by_category.entry(category).or_default() += 1;
        })
        .await
    }

    pub async fn increment_bounces(&self) -> anyhow::Result<()> {
        self.apply(|m| m.buffer.bounces += 1).await
    }

    pub async fn decrement_bounces(&self) -> anyhow::Result<()> {
        self.apply(|m| m.buffer.bounces -= 1).await
    }

    pub async fn add_duration(&self, seconds: u64) -> anyhow::Result<()> {
        self.apply(move |m| m.buffer.duration_seconds += seconds).await
    }

    /// Written through immediately; never buffered.
    pub async fn increment_conversions(
        &self,
        goal_id: &str,
        value: Option<f64>,
    ) -> anyhow::Result<()> {
        let goal_id = goal_id.to_string();
        self.call(move |m| Box::pin(m.increment_conversions(goal_id, value)))
            .await
    }

    /// Persisted totals plus anything still buffered.
    pub async fn get_metrics(&self) -> anyhow::Result<HourlyMetrics> {
        self.apply(|m| m.state.overlay(&m.buffer)).await
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        self.call(|m| Box::pin(m.flush())).await
    }
}
