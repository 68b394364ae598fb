use async_trait::async_trait;

use insights_core::keys::parse_cohort;
use insights_core::retention::{CohortState, RetentionCohortData};

use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

/// Visitors first seen in one ISO week, and which of them came back.
pub struct RetentionCohortActor {
    state: PersistentState<CohortState>,
}

#[async_trait]
impl Actor for RetentionCohortActor {
    const KIND: &'static str = "retention_cohort";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let mut state = PersistentState::<CohortState>::load(&ctx, Self::KIND).await?;
        if state.application_id.is_empty() {
            let parsed = parse_cohort(ctx.key());
            state.application_id = parsed.application_id;
            state.cohort_week = parsed.cohort_week;
        }
        Ok(Self { state })
    }
}

impl RetentionCohortActor {
    async fn add_visitor(&mut self, visitor_id: String) -> anyhow::Result<bool> {
        if !self.state.add_visitor(&visitor_id) {
            return Ok(false);
        }
        self.state.write().await?;
        Ok(true)
    }

    async fn record_return_visit(&mut self, visitor_id: String, weeks: u32) -> anyhow::Result<bool> {
        if !self.state.record_return(&visitor_id, weeks) {
            return Ok(false);
        }
        self.state.write().await?;
        Ok(true)
    }
}

impl ActorRef<RetentionCohortActor> {
    /// Returns `false` if the visitor was already a member.
    pub async fn add_visitor(&self, visitor_id: &str) -> anyhow::Result<bool> {
        let visitor_id = visitor_id.to_string();
        self.call(move |c| Box::pin(c.add_visitor(visitor_id))).await
    }

    /// A no-op for visitors that never joined this cohort.
    pub async fn record_return_visit(&self, visitor_id: &str, weeks: u32) -> anyhow::Result<bool> {
        let visitor_id = visitor_id.to_string();
        self.call(move |c| Box::pin(c.record_return_visit(visitor_id, weeks)))
            .await
    }

    pub async fn get_data(&self) -> anyhow::Result<RetentionCohortData> {
        self.apply(|c| c.state.data()).await
    }
}
