use std::collections::BTreeMap;

use async_trait::async_trait;

use insights_core::visitor::{VisitData, VisitOutcome, VisitorState};

use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

pub struct VisitorActor {
    ctx: ActorContext,
    state: PersistentState<VisitorState>,
}

#[async_trait]
impl Actor for VisitorActor {
    const KIND: &'static str = "visitor";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let state = PersistentState::load(&ctx, Self::KIND).await?;
        Ok(Self { ctx, state })
    }
}

impl VisitorActor {
    async fn record_visit(&mut self, data: VisitData) -> anyhow::Result<VisitOutcome> {
        let outcome = self.state.record_visit(self.ctx.key(), data, self.ctx.now());
        self.state.write().await?;
        Ok(outcome)
    }

    async fn record_page_view(&mut self) -> anyhow::Result<()> {
        self.state.total_page_views += 1;
        self.state.last_seen = Some(self.ctx.now());
        self.state.write().await
    }

    async fn identify(&mut self, user_id: String) -> anyhow::Result<()> {
        self.state.user_id = Some(user_id);
        self.state.write().await
    }

    async fn set_attributes(&mut self, attributes: BTreeMap<String, String>) -> anyhow::Result<()> {
        self.state.merge_attributes(attributes);
        self.state.write().await
    }
}

impl ActorRef<VisitorActor> {
    /// Start of a new session for this visitor. The outcome says whether this
    /// was the first visit and when the visitor was first seen.
    pub async fn record_visit(&self, data: VisitData) -> anyhow::Result<VisitOutcome> {
        self.call(move |v| Box::pin(v.record_visit(data))).await
    }

    pub async fn record_page_view(&self) -> anyhow::Result<()> {
        self.call(|v| Box::pin(v.record_page_view())).await
    }

    pub async fn identify(&self, user_id: &str) -> anyhow::Result<()> {
        let user_id = user_id.to_string();
        self.call(move |v| Box::pin(v.identify(user_id))).await
    }

    pub async fn set_attributes(&self, attributes: BTreeMap<String, String>) -> anyhow::Result<()> {
        self.call(move |v| Box::pin(v.set_attributes(attributes)))
            .await
    }

    pub async fn get_info(&self) -> anyhow::Result<Option<VisitorState>> {
        self.apply(|v| v.state.record_exists().then(|| v.state.clone()))
            .await
    }
}
