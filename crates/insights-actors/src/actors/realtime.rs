//! Active-visitor presence, sharded by visitor id.
//!
//! Every incoming event writes to exactly one of the application's
//! [`REALTIME_SHARD_COUNT`] shards, chosen by
//! [`keys::realtime_shard_for_visitor`]. Reads go through the coordinator,
//! which gathers all shards and merges them.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use insights_core::keys::{self, parse_realtime_coordinator, REALTIME_SHARD_COUNT};
use insights_core::realtime::{merge_snapshots, PresenceMap, RealTimeSnapshot, ShardSnapshot};

use crate::runtime::{Actor, ActorContext, ActorRef};

/// Shard reads in flight at once per coordinator read.
const SHARD_FANOUT: usize = 16;

/// In-memory presence for `realtime-shard-{app}-{i}`. Nothing is persisted.
pub struct RealTimeShardActor {
    ctx: ActorContext,
    presence: PresenceMap,
    sweep_interval: Duration,
    idle_cutoff: chrono::Duration,
}

#[async_trait]
impl Actor for RealTimeShardActor {
    const KIND: &'static str = "realtime_shard";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let sweep_interval = ctx.config().realtime_sweep_interval();
        let idle_cutoff = ctx.config().realtime_idle_cutoff();
        Ok(Self {
            ctx,
            presence: PresenceMap::default(),
            sweep_interval,
            idle_cutoff,
        })
    }

    fn timer_period(&self) -> Option<Duration> {
        Some(self.sweep_interval)
    }

    async fn on_timer(&mut self) -> anyhow::Result<()> {
        let evicted = self.presence.evict_idle(self.ctx.now(), self.idle_cutoff);
        if evicted > 0 {
            debug!(
                key = %self.ctx.key(),
                evicted,
                remaining = self.presence.len(),
                "idle visitors evicted"
            );
        }
        Ok(())
    }
}

impl ActorRef<RealTimeShardActor> {
    pub async fn record_active_visitor(&self, visitor_id: &str, page: &str) -> anyhow::Result<()> {
        let visitor_id = visitor_id.to_string();
        let page = page.to_string();
        self.apply(move |s| {
            let now = s.ctx.now();
            s.presence.record(&visitor_id, &page, now);
        })
        .await
    }

    /// Returns whether the visitor was present.
    pub async fn remove_active_visitor(&self, visitor_id: &str) -> anyhow::Result<bool> {
        let visitor_id = visitor_id.to_string();
        self.apply(move |s| s.presence.remove(&visitor_id)).await
    }

    pub async fn get_snapshot(&self) -> anyhow::Result<ShardSnapshot> {
        self.apply(|s| s.presence.snapshot()).await
    }
}

/// Read-side view over one application's shards at `realtime-{app}`.
pub struct RealTimeCoordinatorActor {
    ctx: ActorContext,
    application_id: String,
}

#[async_trait]
impl Actor for RealTimeCoordinatorActor {
    const KIND: &'static str = "realtime_coordinator";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let application_id = parse_realtime_coordinator(ctx.key());
        Ok(Self {
            ctx,
            application_id,
        })
    }
}

impl RealTimeCoordinatorActor {
    async fn snapshot(&self) -> anyhow::Result<RealTimeSnapshot> {
        let runtime = self.ctx.runtime();
        let shards: Vec<ShardSnapshot> = stream::iter(0..REALTIME_SHARD_COUNT)
            .map(|shard| {
                let shard = runtime
                    .actor::<RealTimeShardActor>(&keys::realtime_shard(&self.application_id, shard));
                async move { shard.get_snapshot().await }
            })
            .buffer_unordered(SHARD_FANOUT)
            .try_collect()
            .await?;
        Ok(merge_snapshots(shards, self.ctx.now()))
    }
}

impl ActorRef<RealTimeCoordinatorActor> {
    /// Active visitors and per-page counts summed over every shard.
    pub async fn get_snapshot(&self) -> anyhow::Result<RealTimeSnapshot> {
        self.call(|c| Box::pin(c.snapshot())).await
    }
}
