use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use insights_core::keys::{self, parse_daily_metrics};
use insights_core::metrics::{DailyMetrics, HourlyMetrics};

use super::HourlyMetricsActor;
use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState, Runtime};

/// Day totals built by summing hourly snapshots. Has no writers besides
/// [`aggregate_from_hourly`](ActorRef::aggregate_from_hourly).
pub struct DailyMetricsActor {
    state: PersistentState<DailyMetrics>,
}

#[async_trait]
impl Actor for DailyMetricsActor {
    const KIND: &'static str = "daily_metrics";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let mut state = PersistentState::<DailyMetrics>::load(&ctx, Self::KIND).await?;
        if state.application_id.is_empty() {
            let parsed = parse_daily_metrics(ctx.key());
            state.application_id = parsed.application_id;
            state.date = parsed.date;
        }
        Ok(Self { state })
    }
}

impl DailyMetricsActor {
    async fn aggregate_from_hourly(&mut self, hour: HourlyMetrics) -> anyhow::Result<()> {
        self.state.add_hour(&hour);
        self.state.write().await
    }
}

impl ActorRef<DailyMetricsActor> {
    pub async fn aggregate_from_hourly(&self, hour: HourlyMetrics) -> anyhow::Result<()> {
        self.call(move |d| Box::pin(d.aggregate_from_hourly(hour))).await
    }

    pub async fn get_metrics(&self) -> anyhow::Result<DailyMetrics> {
        self.apply(|d| d.state.clone()).await
    }
}

/// Fold the hour bucket containing `hour` into its day.
///
/// Each call adds the hour's current totals again; callers roll an hour up
/// once, after it has closed.
pub async fn roll_up_hour(
    runtime: &Runtime,
    application_id: &str,
    hour: DateTime<Utc>,
) -> anyhow::Result<()> {
    let hourly = runtime.actor::<HourlyMetricsActor>(&keys::hourly_metrics(application_id, hour));
    let snapshot = hourly.get_metrics().await?;
    let daily = runtime.actor::<DailyMetricsActor>(&keys::daily_metrics(
        application_id,
        hour.date_naive(),
    ));
    daily.aggregate_from_hourly(snapshot).await?;
    debug!(application_id, hour = %hour, "hour rolled up");
    Ok(())
}
