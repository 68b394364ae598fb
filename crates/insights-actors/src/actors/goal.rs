use async_trait::async_trait;

use insights_core::goal::{CreateGoal, Goal, GoalContext, UpdateGoal};

use crate::error::RuntimeError;
use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

pub struct GoalActor {
    ctx: ActorContext,
    state: PersistentState<Goal>,
}

#[async_trait]
impl Actor for GoalActor {
    const KIND: &'static str = "goal";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let state = PersistentState::load(&ctx, Self::KIND).await?;
        Ok(Self { ctx, state })
    }
}

impl GoalActor {
    async fn create(&mut self, request: CreateGoal) -> anyhow::Result<()> {
        // Conversions and hourly counters refer to the bare goal id.
        let prefix = format!("goal-{}-", request.application_id);
        let id = self
            .ctx
            .key()
            .strip_prefix(&prefix)
            .unwrap_or(self.ctx.key())
            .to_string();
        *self.state = Goal {
            id,
            application_id: request.application_id,
            name: request.name,
            goal_type: request.goal_type,
            condition: request.condition,
            monetary_value: request.monetary_value,
            is_active: true,
            total_conversions: 0,
            created_at: self.ctx.now(),
        };
        self.state.write().await
    }

    async fn update(&mut self, request: UpdateGoal) -> anyhow::Result<()> {
        if let Some(name) = request.name {
            self.state.name = name;
        }
        if let Some(condition) = request.condition {
            self.state.condition = condition;
        }
        if request.monetary_value.is_some() {
            self.state.monetary_value = request.monetary_value;
        }
        if let Some(is_active) = request.is_active {
            self.state.is_active = is_active;
        }
        self.state.write().await
    }

    async fn record_conversion(&mut self) -> anyhow::Result<()> {
        if !self.state.record_exists() {
            return Err(RuntimeError::NotFound {
                kind: Self::KIND,
                key: self.ctx.key().to_string(),
            }
            .into());
        }
        self.state.total_conversions += 1;
        self.state.write().await
    }
}

impl ActorRef<GoalActor> {
    pub async fn create(&self, request: CreateGoal) -> anyhow::Result<()> {
        self.call(move |g| Box::pin(g.create(request))).await
    }

    pub async fn update(&self, request: UpdateGoal) -> anyhow::Result<()> {
        self.call(move |g| Box::pin(g.update(request))).await
    }

    pub async fn get_info(&self) -> anyhow::Result<Option<Goal>> {
        self.apply(|g| g.state.record_exists().then(|| g.state.clone()))
            .await
    }

    /// Whether `context` satisfies the goal. Unknown and inactive goals never match.
    pub async fn evaluate(&self, context: GoalContext) -> anyhow::Result<bool> {
        self.apply(move |g| g.state.evaluate(&context)).await
    }

    pub async fn record_conversion(&self) -> anyhow::Result<()> {
        self.call(|g| Box::pin(g.record_conversion())).await
    }

    pub async fn delete(&self) -> anyhow::Result<()> {
        self.call(|g| Box::pin(g.state.clear())).await
    }
}
