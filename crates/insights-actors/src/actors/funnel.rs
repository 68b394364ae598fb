use async_trait::async_trait;

use insights_core::funnel::{CreateFunnel, FunnelDefinition, FunnelStep};

use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

/// A user-defined funnel at `funnel-{app}-{funnelId}`.
pub struct FunnelActor {
    ctx: ActorContext,
    state: PersistentState<FunnelDefinition>,
}

#[async_trait]
impl Actor for FunnelActor {
    const KIND: &'static str = "funnel";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let state = PersistentState::load(&ctx, Self::KIND).await?;
        Ok(Self { ctx, state })
    }
}

impl FunnelActor {
    async fn create(&mut self, request: CreateFunnel) -> anyhow::Result<()> {
        // Day aggregators are keyed by the bare funnel id.
        let prefix = format!("funnel-{}-", request.application_id);
        let id = self
            .ctx
            .key()
            .strip_prefix(&prefix)
            .unwrap_or(self.ctx.key())
            .to_string();
        *self.state = FunnelDefinition {
            id,
            application_id: request.application_id,
            name: request.name,
            steps: request.steps,
            created_at: self.ctx.now(),
            is_active: true,
        };
        self.state.write().await
    }

    async fn update(&mut self, name: String, steps: Vec<FunnelStep>) -> anyhow::Result<()> {
        self.state.name = name;
        self.state.steps = steps;
        self.state.write().await
    }

    async fn set_active(&mut self, is_active: bool) -> anyhow::Result<()> {
        self.state.is_active = is_active;
        self.state.write().await
    }
}

impl ActorRef<FunnelActor> {
    pub async fn create(&self, request: CreateFunnel) -> anyhow::Result<()> {
        self.call(move |f| Box::pin(f.create(request))).await
    }

    pub async fn update(&self, name: String, steps: Vec<FunnelStep>) -> anyhow::Result<()> {
        self.call(move |f| Box::pin(f.update(name, steps))).await
    }

    pub async fn set_active(&self, is_active: bool) -> anyhow::Result<()> {
        self.call(move |f| Box::pin(f.set_active(is_active))).await
    }

    pub async fn delete(&self) -> anyhow::Result<()> {
        self.call(|f| Box::pin(f.state.clear())).await
    }

    /// `None` until the funnel has been created, and again after delete.
    pub async fn get_info(&self) -> anyhow::Result<Option<FunnelDefinition>> {
        self.apply(|f| f.state.record_exists().then(|| f.state.clone()))
            .await
    }
}
