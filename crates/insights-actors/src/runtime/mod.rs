//! Per-key entity actors on tokio.
//!
//! Every `(actor type, key)` pair is served by at most one worker task at a
//! time. The worker owns the actor value and an unbounded mailbox, runs calls
//! and timer ticks strictly one after another, and retires itself after an
//! idle period. A key is only released from the registry after the worker has
//! drained its mailbox and run [`Actor::on_deactivate`], so the next
//! activation always loads the flushed state.

mod actor;
mod state;
mod worker;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, error, info, warn};

use insights_core::clock::Clock;
use insights_core::config::Config;
use insights_state::StateStore;

use crate::error::RuntimeError;

pub use actor::{Actor, ActorContext, ActorRef};
pub use state::PersistentState;

pub(crate) use actor::Command;

/// Shutdown gives up after this many deactivation rounds.
const MAX_SHUTDOWN_ROUNDS: usize = 8;

/// Handle to the actor system. Cheap to clone.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: Config,
    registries: Mutex<HashMap<TypeId, Arc<dyn ErasedRegistry>>>,
}

struct Slot<A: Actor> {
    tx: mpsc::UnboundedSender<Command<A>>,
    generation: u64,
    stopped: watch::Receiver<bool>,
}

/// Live activations of one actor type.
struct Registry<A: Actor> {
    slots: Mutex<HashMap<String, Slot<A>>>,
    next_generation: AtomicU64,
}

impl<A: Actor> Registry<A> {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }
}

#[async_trait]
trait ErasedRegistry: Send + Sync + 'static {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn kind(&self) -> &'static str;
    async fn keys(&self) -> Vec<String>;
    async fn deactivate(&self, runtime: &Runtime, key: &str);
}

#[async_trait]
impl<A: Actor> ErasedRegistry for Registry<A> {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn kind(&self) -> &'static str {
        A::KIND
    }

    async fn keys(&self) -> Vec<String> {
        self.slots.lock().await.keys().cloned().collect()
    }

    async fn deactivate(&self, runtime: &Runtime, key: &str) {
        if let Err(err) = runtime.deactivate::<A>(key).await {
            error!(kind = A::KIND, key, error = %err, "deactivation failed");
        }
    }
}

impl Runtime {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                store,
                clock,
                config,
                registries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Address the actor of type `A` at `key`. Nothing is activated until the
    /// first call.
    pub fn actor<A: Actor>(&self, key: &str) -> ActorRef<A> {
        ActorRef::new(self.clone(), key)
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.inner.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Number of live activations of `A`.
    pub async fn active_count<A: Actor>(&self) -> Result<usize, RuntimeError> {
        Ok(self.registry::<A>().await?.slots.lock().await.len())
    }

    pub async fn is_active<A: Actor>(&self, key: &str) -> Result<bool, RuntimeError> {
        Ok(self.registry::<A>().await?.slots.lock().await.contains_key(key))
    }

    async fn registry<A: Actor>(&self) -> Result<Arc<Registry<A>>, RuntimeError> {
        let mut registries = self.inner.registries.lock().await;
        let erased = registries
            .entry(TypeId::of::<A>())
            .or_insert_with(|| {
                let fresh: Arc<dyn ErasedRegistry> = Arc::new(Registry::<A>::new());
                fresh
            })
            .clone();
        erased
            .as_any()
            .downcast::<Registry<A>>()
            .map_err(|_| RuntimeError::RegistryMismatch { kind: A::KIND })
    }

    /// Deliver `command` to the activation for `key`, spawning one if needed.
    ///
    /// If the current activation is shutting down its mailbox is already
    /// closed; wait for it to finish flushing and retry on a fresh one.
    pub(crate) async fn dispatch<A: Actor>(
        &self,
        key: &str,
        mut command: Command<A>,
    ) -> Result<(), RuntimeError> {
        let registry = self.registry::<A>().await?;
        loop {
            let (tx, mut stopped, generation) = {
                let mut slots = registry.slots.lock().await;
                match slots.get(key) {
                    Some(slot) => (slot.tx.clone(), slot.stopped.clone(), slot.generation),
                    None => {
                        let slot = self.spawn_worker::<A>(&registry, key);
                        let handles = (slot.tx.clone(), slot.stopped.clone(), slot.generation);
                        slots.insert(key.to_string(), slot);
                        handles
                    }
                }
            };
            match tx.send(command) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    command = returned;
                    self.await_stopped::<A>(key, generation, &mut stopped).await;
                }
            }
        }
    }

    fn spawn_worker<A: Actor>(&self, registry: &Registry<A>, key: &str) -> Slot<A> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stopped_tx, stopped) = watch::channel(false);
        let generation = registry.next_generation.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(worker::run::<A>(
            self.clone(),
            Arc::from(key),
            generation,
            rx,
            stopped_tx,
        ));
        debug!(kind = A::KIND, key, generation, "actor activation spawned");
        Slot {
            tx,
            generation,
            stopped,
        }
    }

    /// Wait for an activation to finish. A worker that vanished without
    /// signalling (it panicked) is released here instead.
    async fn await_stopped<A: Actor>(
        &self,
        key: &str,
        generation: u64,
        stopped: &mut watch::Receiver<bool>,
    ) {
        if stopped.wait_for(|done| *done).await.is_err() {
            warn!(kind = A::KIND, key, generation, "actor worker exited without signalling");
            self.release::<A>(key, generation).await;
        }
    }

    /// Drop the registry entry for `key` if it still belongs to `generation`.
    pub(crate) async fn release<A: Actor>(&self, key: &str, generation: u64) {
        let registry = match self.registry::<A>().await {
            Ok(registry) => registry,
            Err(err) => {
                error!(kind = A::KIND, key, generation, error = %err, "cannot release activation");
                return;
            }
        };
        let mut slots = registry.slots.lock().await;
        if slots.get(key).is_some_and(|slot| slot.generation == generation) {
            slots.remove(key);
        }
    }

    /// Deactivate `key` now: queued calls run, then the deactivation hook.
    /// Returns once the key has been released. A no-op for inactive keys.
    pub async fn deactivate<A: Actor>(&self, key: &str) -> Result<(), RuntimeError> {
        let handles = {
            let registry = self.registry::<A>().await?;
            let slots = registry.slots.lock().await;
            slots
                .get(key)
                .map(|slot| (slot.tx.clone(), slot.stopped.clone(), slot.generation))
        };
        let Some((tx, mut stopped, generation)) = handles else {
            return Ok(());
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(Command::Deactivate(reply_tx)).is_ok() {
            // The sender is dropped without a reply only if the worker died.
            let _ = reply_rx.await;
        }
        self.await_stopped::<A>(key, generation, &mut stopped).await;
        Ok(())
    }

    /// Deactivate every live actor, flushing buffered state. Keys activated
    /// while flushing are picked up in the next round.
    pub async fn shutdown(&self) {
        for round in 0..MAX_SHUTDOWN_ROUNDS {
            let registries: Vec<Arc<dyn ErasedRegistry>> =
                self.inner.registries.lock().await.values().cloned().collect();

            let mut deactivated = 0;
            for registry in registries {
                let keys = registry.keys().await;
                if keys.is_empty() {
                    continue;
                }
                deactivated += keys.len();
                info!(kind = registry.kind(), count = keys.len(), round, "deactivating actors");
                join_all(keys.iter().map(|key| registry.deactivate(self, key))).await;
            }
            if deactivated == 0 {
                return;
            }
        }
        warn!(rounds = MAX_SHUTDOWN_ROUNDS, "actors still active after shutdown");
    }
}

pub(crate) fn unavailable<A: Actor>(key: &str) -> RuntimeError {
    RuntimeError::Unavailable {
        kind: A::KIND,
        key: key.to_string(),
    }
}
