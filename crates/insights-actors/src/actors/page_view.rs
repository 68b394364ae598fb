use async_trait::async_trait;

use insights_core::records::{NewPageView, PageViewRecord};

use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

/// One page view, written once at `pv-{app}-{pageViewId}`.
pub struct PageViewActor {
    key: String,
    state: PersistentState<PageViewRecord>,
}

#[async_trait]
impl Actor for PageViewActor {
    const KIND: &'static str = "page_view";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let state = PersistentState::load(&ctx, Self::KIND).await?;
        Ok(Self {
            key: ctx.key().to_string(),
            state,
        })
    }
}

impl PageViewActor {
    async fn record(&mut self, data: NewPageView) -> anyhow::Result<()> {
        *self.state = data.into_record(&self.key);
        self.state.write().await
    }
}

impl ActorRef<PageViewActor> {
    pub async fn record(&self, data: NewPageView) -> anyhow::Result<()> {
        self.call(move |p| Box::pin(p.record(data))).await
    }

    pub async fn get_info(&self) -> anyhow::Result<Option<PageViewRecord>> {
        self.apply(|p| p.state.record_exists().then(|| p.state.clone()))
            .await
    }
}
