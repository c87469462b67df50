use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use super::SimpleLock;
use crate::CoordinationClient;
use crate::Error;
use crate::Result;
use crate::WatchEngine;

/// One [`SimpleLock`] per lock directory
///
/// Initialization is serialized so concurrent first uses of a directory end
/// up with the same handle.
pub struct LockRegistry {
    client: Arc<dyn CoordinationClient>,
    engine: Arc<WatchEngine>,
    node_prefix: String,
    locks: Mutex<HashMap<String, Arc<SimpleLock>>>,
}

impl LockRegistry {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        engine: Arc<WatchEngine>,
        node_prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            engine,
            node_prefix: node_prefix.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Initialize the lock for `dir`.
    ///
    /// Fails with [`Error::RepeatedInitialization`] if a live lock already
    /// exists for `dir`. A destroyed lock may be initialized again.
    pub async fn init(
        &self,
        dir: &str,
    ) -> Result<Arc<SimpleLock>> {
        let mut locks = self.locks.lock().await;
        if let Some(existing) = locks.get(dir) {
            if !existing.is_destroyed() {
                return Err(Error::RepeatedInitialization(dir.to_string()));
            }
        }

        let lock =
            SimpleLock::init(self.client.clone(), self.engine.clone(), dir, &self.node_prefix).await?;
        locks.insert(dir.to_string(), lock.clone());
        Ok(lock)
    }

    /// The live lock for `dir`, initializing it on first use.
    pub async fn get_or_init(
        &self,
        dir: &str,
    ) -> Result<Arc<SimpleLock>> {
        match self.init(dir).await {
            Err(Error::RepeatedInitialization(_)) => {
                warn!(dir, "Repeated lock initialization, reusing existing handle");
                self.get(dir).await.ok_or_else(|| Error::Fatal(format!("lock {dir} vanished")))
            }
            other => other,
        }
    }

    pub async fn get(
        &self,
        dir: &str,
    ) -> Option<Arc<SimpleLock>> {
        self.locks.lock().await.get(dir).cloned()
    }

    pub async fn lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }
}
