use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use insights_core::error::CoreError;
use insights_state::StateStore;

use super::ActorContext;

/// An actor's durable state: one JSON blob under `(kind, key)`.
///
/// Dereferences to the state value. Mutations stay in memory until
/// [`write`](Self::write) is called.
pub struct PersistentState<S> {
    store: Arc<dyn StateStore>,
    kind: &'static str,
    key: String,
    value: S,
    exists: bool,
}

impl<S> PersistentState<S>
where
    S: Serialize + DeserializeOwned + Default + Send + Sync,
{
    /// Load the blob for the context's key, or start from `S::default()`.
    pub async fn load(ctx: &ActorContext, kind: &'static str) -> anyhow::Result<Self> {
        let store = ctx.runtime().store().clone();
        let key = ctx.key().to_string();
        let (value, exists) = match store.load(kind, &key).await? {
            Some(blob) => (
                serde_json::from_slice(&blob).map_err(CoreError::from)?,
                true,
            ),
            None => (S::default(), false),
        };
        Ok(Self {
            store,
            kind,
            key,
            value,
            exists,
        })
    }

    pub async fn write(&mut self) -> anyhow::Result<()> {
        let blob = serde_json::to_vec(&self.value).map_err(CoreError::from)?;
        self.store.save(self.kind, &self.key, &blob).await?;
        self.exists = true;
        Ok(())
    }

    /// Remove the blob and reset the in-memory value to its default.
    pub async fn clear(&mut self) -> anyhow::Result<()> {
        self.store.clear(self.kind, &self.key).await?;
        self.value = S::default();
        self.exists = false;
        Ok(())
    }

    /// Whether a blob was loaded or has since been written.
    pub fn record_exists(&self) -> bool {
        self.exists
    }
}

impl<S> Deref for PersistentState<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.value
    }
}

impl<S> DerefMut for PersistentState<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.value
    }
}
