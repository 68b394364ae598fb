use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use insights_core::config::Config;

use super::{unavailable, Runtime};

/// A unit of state addressed by a string key.
///
/// One value of the implementing type exists per live key. All of its methods
/// run on the key's worker, one at a time, so implementations keep plain
/// `&mut self` state with no locking.
#[async_trait]
pub trait Actor: Sized + Send + 'static {
    /// Namespace for this actor's durable state and its log lines.
    const KIND: &'static str;

    /// Build the actor for `ctx.key()`, loading durable state. Called on the
    /// first call to an inactive key.
    async fn activate(ctx: ActorContext) -> anyhow::Result<Self>;

    /// Period of the activation's timer, if it has one. The first tick fires
    /// one period after activation.
    fn timer_period(&self) -> Option<Duration> {
        None
    }

    async fn on_timer(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Last chance to persist in-memory state before the activation goes away.
    async fn on_deactivate(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What an activation knows about itself and the system around it.
#[derive(Clone)]
pub struct ActorContext {
    key: Arc<str>,
    runtime: Runtime,
}

impl ActorContext {
    pub(crate) fn new(key: Arc<str>, runtime: Runtime) -> Self {
        Self { key, runtime }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn config(&self) -> &Config {
        self.runtime.config()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.runtime.clock().now()
    }
}

pub(crate) type Job<A> = Box<dyn for<'a> FnOnce(&'a mut A) -> BoxFuture<'a, ()> + Send>;

pub(crate) enum Command<A> {
    Call(Job<A>),
    Deactivate(oneshot::Sender<()>),
}

fn job<A, F>(f: F) -> Job<A>
where
    F: for<'a> FnOnce(&'a mut A) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// Address of one actor. Calls activate the actor on demand.
pub struct ActorRef<A: Actor> {
    runtime: Runtime,
    key: Arc<str>,
    _actor: PhantomData<fn() -> A>,
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            key: self.key.clone(),
            _actor: PhantomData,
        }
    }
}

impl<A: Actor> std::fmt::Debug for ActorRef<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRef")
            .field("kind", &A::KIND)
            .field("key", &self.key)
            .finish()
    }
}

impl<A: Actor> ActorRef<A> {
    pub(crate) fn new(runtime: Runtime, key: &str) -> Self {
        Self {
            runtime,
            key: Arc::from(key),
            _actor: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run `f` against the actor on its worker and return its result.
    ///
    /// ```ignore
    /// let views = hourly.call(|m| Box::pin(async move { Ok(m.page_views()) })).await?;
    /// ```
    pub async fn call<R, F>(&self, f: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut A) -> BoxFuture<'a, anyhow::Result<R>> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = Command::Call(job(move |actor: &mut A| {
            Box::pin(async move {
                let result = f(actor).await;
                // The caller may have given up waiting; nothing to do then.
                let _ = reply_tx.send(result);
            })
        }));
        self.runtime.dispatch::<A>(&self.key, command).await?;
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(unavailable::<A>(&self.key).into()),
        }
    }

    /// Run a synchronous `f` against the actor on its worker.
    pub async fn apply<R, F>(&self, f: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut A) -> R + Send + 'static,
    {
        self.call(move |actor| Box::pin(async move { Ok::<R, anyhow::Error>(f(actor)) }))
            .await
    }
}
