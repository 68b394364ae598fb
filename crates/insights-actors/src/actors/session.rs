use async_trait::async_trait;
use tracing::warn;

use insights_core::keys;
use insights_core::session::{SessionInfo, SessionStart, SessionState};

use super::{best_effort, HourlyMetricsActor};
use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

/// One visit's lifecycle at `session-{app}-{sessionId}`.
///
/// Every transition is written before its hourly counters are forwarded.
/// Forwarding failures are logged and do not fail the transition.
pub struct SessionActor {
    ctx: ActorContext,
    state: PersistentState<SessionState>,
}

#[async_trait]
impl Actor for SessionActor {
    const KIND: &'static str = "session";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let state = PersistentState::load(&ctx, Self::KIND).await?;
        Ok(Self { ctx, state })
    }
}

impl SessionActor {
    /// The hour bucket for the current time, or `None` for a session that
    /// was never started and so has no application.
    fn current_hour(&self) -> Option<ActorRef<HourlyMetricsActor>> {
        if self.state.application_id.is_empty() {
            warn!(key = %self.ctx.key(), "session not started; hourly metrics skipped");
            return None;
        }
        let key = keys::hourly_metrics(&self.state.application_id, self.ctx.now());
        Some(self.ctx.runtime().actor(&key))
    }

    async fn start(&mut self, data: SessionStart) -> anyhow::Result<()> {
        let visitor_id = data.visitor_id.clone();
        *self.state = SessionState::start(self.ctx.key(), data, self.ctx.now());
        self.state.write().await?;

        if let Some(hourly) = self.current_hour() {
            best_effort(hourly.increment_sessions().await, self.ctx.key(), "sessions");
            best_effort(
                hourly.increment_unique_visitors(&visitor_id).await,
                self.ctx.key(),
                "unique_visitors",
            );
        }
        Ok(())
    }

    async fn record_page_view(&mut self) -> anyhow::Result<()> {
        self.state.record_page_view();
        self.state.write().await?;

        if let Some(hourly) = self.current_hour() {
            best_effort(hourly.increment_page_views().await, self.ctx.key(), "page_views");
        }
        Ok(())
    }

    async fn record_event(&mut self, category: String) -> anyhow::Result<()> {
        self.state.record_event();
        self.state.write().await?;

        if let Some(hourly) = self.current_hour() {
            best_effort(hourly.increment_events(&category).await, self.ctx.key(), "events");
        }
        Ok(())
    }

    // A second end forwards its bounce and duration again.
    async fn end(&mut self, exit_page: Option<String>) -> anyhow::Result<()> {
        self.state.end(exit_page, self.ctx.now());
        self.state.write().await?;

        if let Some(hourly) = self.current_hour() {
            if self.state.is_bounce {
                best_effort(hourly.increment_bounces().await, self.ctx.key(), "bounces");
            }
            best_effort(
                hourly.add_duration(self.state.duration_seconds).await,
                self.ctx.key(),
                "duration",
            );
        }
        Ok(())
    }

    async fn record_conversion(&mut self, goal_id: String) -> anyhow::Result<bool> {
        if !self.state.record_conversion(&goal_id) {
            return Ok(false);
        }
        self.state.write().await?;
        Ok(true)
    }
}

impl ActorRef<SessionActor> {
    pub async fn start(&self, data: SessionStart) -> anyhow::Result<()> {
        self.call(move |s| Box::pin(s.start(data))).await
    }

    pub async fn record_page_view(&self) -> anyhow::Result<()> {
        self.call(|s| Box::pin(s.record_page_view())).await
    }

    pub async fn record_event(&self, category: &str) -> anyhow::Result<()> {
        let category = category.to_string();
        self.call(move |s| Box::pin(s.record_event(category))).await
    }

    pub async fn end(&self, exit_page: Option<String>) -> anyhow::Result<()> {
        self.call(move |s| Box::pin(s.end(exit_page))).await
    }

    /// Returns `false` if the goal had already converted in this session.
    pub async fn record_conversion(&self, goal_id: &str) -> anyhow::Result<bool> {
        let goal_id = goal_id.to_string();
        self.call(move |s| Box::pin(s.record_conversion(goal_id))).await
    }

    pub async fn get_info(&self) -> anyhow::Result<SessionInfo> {
        self.apply(|s| s.state.info()).await
    }
}
