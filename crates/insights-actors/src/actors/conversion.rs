use async_trait::async_trait;

use insights_core::keys;
use insights_core::records::{ConversionRecord, NewConversion};

use super::{best_effort, GoalActor, HourlyMetricsActor};
use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

/// A recorded goal conversion.
///
/// The record is written first. The goal counter and the hourly conversion
/// totals are then bumped without rollback, so a failure between the two
/// leaves the record without its counters.
pub struct ConversionActor {
    ctx: ActorContext,
    state: PersistentState<ConversionRecord>,
}

#[async_trait]
impl Actor for ConversionActor {
    const KIND: &'static str = "conversion";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let state = PersistentState::load(&ctx, Self::KIND).await?;
        Ok(Self { ctx, state })
    }
}

impl ConversionActor {
    async fn record(&mut self, data: NewConversion) -> anyhow::Result<()> {
        let now = self.ctx.now();
        *self.state = data.into_record(self.ctx.key(), now);
        self.state.write().await?;

        let app = &self.state.application_id;
        let runtime = self.ctx.runtime();
        let goal = runtime.actor::<GoalActor>(&keys::goal(app, &self.state.goal_id));
        best_effort(goal.record_conversion().await, self.ctx.key(), "goal_conversions");

        let hourly = runtime.actor::<HourlyMetricsActor>(&keys::hourly_metrics(app, now));
        best_effort(
            hourly
                .increment_conversions(&self.state.goal_id, self.state.value)
                .await,
            self.ctx.key(),
            "hourly_conversions",
        );
        Ok(())
    }
}

impl ActorRef<ConversionActor> {
    pub async fn record(&self, data: NewConversion) -> anyhow::Result<()> {
        self.call(move |c| Box::pin(c.record(data))).await
    }

    pub async fn get_info(&self) -> anyhow::Result<Option<ConversionRecord>> {
        self.apply(|c| c.state.record_exists().then(|| c.state.clone()))
            .await
    }
}
