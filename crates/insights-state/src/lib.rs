use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Durable blob-per-key storage for actor state.
///
/// Every actor type owns a `kind` namespace and each activation reads and
/// writes exactly one blob under `(kind, key)`. The store knows nothing about
/// the blob's shape; actors serialize their own state. Implementations must
/// make `save` visible to the next `load` of the same `(kind, key)` once it
/// returns, and must not retry internally on behalf of the caller.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn load(&self, kind: &str, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn save(&self, kind: &str, key: &str, payload: &[u8]) -> anyhow::Result<()>;
    /// Remove the blob. Clearing a missing key is not an error.
    async fn clear(&self, kind: &str, key: &str) -> anyhow::Result<()>;
}

/// Process-local [`StateStore`] backed by a `HashMap`.
///
/// Cheap to clone; clones share the same map. Used by tests and by
/// `INSIGHTS_STORE=memory`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    blobs: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs across all kinds.
    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, kind: &str, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let blobs = self.blobs.lock().await;
        Ok(blobs.get(&(kind.to_string(), key.to_string())).cloned())
    }

    async fn save(&self, kind: &str, key: &str, payload: &[u8]) -> anyhow::Result<()> {
        let mut blobs = self.blobs.lock().await;
        blobs.insert((kind.to_string(), key.to_string()), payload.to_vec());
        Ok(())
    }

    async fn clear(&self, kind: &str, key: &str) -> anyhow::Result<()> {
        let mut blobs = self.blobs.lock().await;
        blobs.remove(&(kind.to_string(), key.to_string()));
        Ok(())
    }
}
