use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use insights_core::funnel::{FunnelDayAnalytics, FunnelDayState, PendingSteps};
use insights_core::keys::parse_funnel_analytics;

use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

/// Step completions for one funnel on one day, at
/// `funnel-analytics-{funnelId}-{yyyyMMdd}`.
///
/// Completions are buffered per step and merged on the flush timer and on
/// deactivation. Reads overlay the buffer, so a completion is visible as soon
/// as its call returns.
pub struct FunnelAnalyticsActor {
    key: String,
    state: PersistentState<FunnelDayState>,
    pending: PendingSteps,
    dirty: bool,
    flush_interval: Duration,
}

#[async_trait]
impl Actor for FunnelAnalyticsActor {
    const KIND: &'static str = "funnel_analytics";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let mut state = PersistentState::<FunnelDayState>::load(&ctx, Self::KIND).await?;
        if state.funnel_id.is_empty() {
            let parsed = parse_funnel_analytics(ctx.key());
            state.funnel_id = parsed.funnel_id;
            state.date = parsed.date;
        }
        Ok(Self {
            key: ctx.key().to_string(),
            state,
            pending: PendingSteps::new(),
            dirty: false,
            flush_interval: ctx.config().funnel_flush_interval(),
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

impl FunnelAnalyticsActor {
    pub async fn flush(&mut self) -> anyhow::Result<()> {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            let counted = self.state.merge_pending(&pending);
            debug!(key = %self.key, counted, "funnel completions merged");
            self.dirty = true;
        }
        if !self.dirty {
            return Ok(());
        }
        if let Err(e) = self.state.write().await {
            error!(key = %self.key, error = %e, "funnel day flush failed");
            return Err(e);
        }
        self.dirty = false;
        Ok(())
    }
}

impl ActorRef<FunnelAnalyticsActor> {
    pub async fn record_step_completion(
        &self,
        visitor_id: &str,
        step_order: u32,
    ) -> anyhow::Result<()> {
        let visitor_id = visitor_id.to_string();
        self.apply(move |f| {
            f.pending.entry(step_order).or_default().insert(visitor_id);
        })
        .await
    }

    pub async fn get_analytics(&self) -> anyhow::Result<FunnelDayAnalytics> {
        self.apply(|f| f.state.overlay(&f.pending)).await
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        self.call(|f| Box::pin(f.flush())).await
    }
}
