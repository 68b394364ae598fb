use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::try_join_all;
use tracing::debug;

use insights_core::error::CoreError;
use insights_core::funnel::{compute_funnel_analytics, merge_days, FunnelAnalytics};
use insights_core::keys::{self, summary_definition_key};

use super::{FunnelActor, FunnelAnalyticsActor};
use crate::runtime::{Actor, ActorContext, ActorRef};

/// Longest date range a single summary read may span.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Date-range view over a funnel's day aggregators. Holds no state.
pub struct FunnelSummaryActor {
    ctx: ActorContext,
}

#[async_trait]
impl Actor for FunnelSummaryActor {
    const KIND: &'static str = "funnel_summary";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        Ok(Self { ctx })
    }
}

impl FunnelSummaryActor {
    async fn analytics(&self, from: NaiveDate, to: NaiveDate) -> anyhow::Result<FunnelAnalytics> {
        let span = (to - from).num_days();
        if span > MAX_RANGE_DAYS {
            return Err(CoreError::InvalidInput(format!(
                "funnel range of {span} days exceeds {MAX_RANGE_DAYS}"
            ))
            .into());
        }

        let Some(definition_key) = summary_definition_key(self.ctx.key()) else {
            return Ok(FunnelAnalytics::unknown());
        };
        let runtime = self.ctx.runtime();
        let definition = runtime
            .actor::<FunnelActor>(&definition_key)
            .get_info()
            .await?
            .filter(|d| !d.steps.is_empty());
        let Some(definition) = definition else {
            debug!(key = %self.ctx.key(), "funnel definition missing");
            return Ok(FunnelAnalytics::unknown());
        };

        let reads = from
            .iter_days()
            .take_while(|day| *day <= to)
            .map(|day| {
                runtime
                    .actor::<FunnelAnalyticsActor>(&keys::funnel_analytics(&definition.id, day))
            })
            .map(|day| async move { day.get_analytics().await });
        let days = try_join_all(reads).await?;

        let merged = merge_days(days);
        Ok(compute_funnel_analytics(&definition, &merged))
    }
}

impl ActorRef<FunnelSummaryActor> {
    /// Funnel results over the inclusive range `from..=to`.
    ///
    /// An unknown funnel yields a zero-valued result named "Unknown".
    pub async fn get_analytics(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<FunnelAnalytics> {
        self.call(move |s| Box::pin(s.analytics(from, to))).await
    }
}
