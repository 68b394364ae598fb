use async_trait::async_trait;

use insights_core::records::{EventRecord, NewEvent};

use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

/// One custom event, written once at `event-{app}-{eventId}`.
pub struct EventActor {
    key: String,
    state: PersistentState<EventRecord>,
}

#[async_trait]
impl Actor for EventActor {
    const KIND: &'static str = "event";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let state = PersistentState::load(&ctx, Self::KIND).await?;
        Ok(Self {
            key: ctx.key().to_string(),
            state,
        })
    }
}

impl EventActor {
    async fn record(&mut self, data: NewEvent) -> anyhow::Result<()> {
        *self.state = data.into_record(&self.key);
        self.state.write().await
    }
}

impl ActorRef<EventActor> {
    pub async fn record(&self, data: NewEvent) -> anyhow::Result<()> {
        self.call(move |e| Box::pin(e.record(data))).await
    }

    pub async fn get_info(&self) -> anyhow::Result<Option<EventRecord>> {
        self.apply(|e| e.state.record_exists().then(|| e.state.clone()))
            .await
    }
}
