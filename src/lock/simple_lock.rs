use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Expiry;
use super::LockOwner;
use super::LockQueue;
use super::Wakeup;
use crate::ensure_path;
use crate::join_path;
use crate::last_segment;
use crate::metrics::LOCK_ACQUISITIONS;
use crate::ChildInterest;
use crate::ConnectionState;
use crate::CoordinationClient;
use crate::CreateMode;
use crate::Error;
use crate::Result;
use crate::ServiceError;
use crate::WatchEngine;

/// Inter-process lock handle
#[async_trait]
pub trait Lock: Send + Sync {
    /// Acquire, waiting as long as it takes.
    ///
    /// Returns `Ok(true)` once held. Fails with [`Error::SessionLost`] if the
    /// session expires while waiting.
    async fn lock(
        &self,
        owner: LockOwner,
    ) -> Result<bool>;

    /// Acquire, waiting at most `timeout`.
    ///
    /// `Ok(false)` on timeout; the attempt leaves no node behind.
    async fn lock_with_timeout(
        &self,
        owner: LockOwner,
        timeout: Duration,
    ) -> Result<bool>;

    /// Drop one hold; the node is deleted when the last hold goes.
    async fn unlock(
        &self,
        owner: LockOwner,
    ) -> Result<()>;

    /// Stop following the lock directory. Held nodes are not deleted.
    fn destroy(&self);
}

/// Reentrant state of one owner
///
/// An entry exists from the moment an owner starts acquiring; it only counts
/// as a hold once `acquired` is set by the grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReentrantState {
    pub node_path: String,
    pub hold_count: u32,
    pub acquired: bool,
}

/// FIFO lock over ephemeral sequential nodes in one directory
pub struct SimpleLock {
    client: Arc<dyn CoordinationClient>,
    engine: Arc<WatchEngine>,
    dir: String,
    /// Path handed to the sequential create, i.e. `<dir>/<prefix>`
    node_base: String,
    queue: Arc<LockQueue>,
    holders: Arc<DashMap<LockOwner, ReentrantState>>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for SimpleLock {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SimpleLock")
            .field("dir", &self.dir)
            .field("node_base", &self.node_base)
            .field("holders", &self.holders.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl SimpleLock {
    /// Prepare the lock directory and start following it.
    ///
    /// Creates the directory if absent, seeds the sibling set from its
    /// current children, subscribes to child changes and hooks session
    /// expiry so parked acquirers are cancelled.
    pub async fn init(
        client: Arc<dyn CoordinationClient>,
        engine: Arc<WatchEngine>,
        dir: &str,
        node_prefix: &str,
    ) -> Result<Arc<Self>> {
        ensure_path(client.as_ref(), dir)
            .await
            .map_err(|e| Error::operation("create", dir, e))?;
        let seed = client
            .get_children(dir, false)
            .await
            .map_err(|e| Error::operation("get_children", dir, e))?;

        let queue = Arc::new(LockQueue::new(dir, seed));
        engine.subscribe_children(dir, queue.clone(), ChildInterest::nodes()).await?;

        let hook_queue = queue.clone();
        let hook_dir = dir.to_string();
        engine.register_expiry_hook(
            dir,
            Arc::new(move |_: ConnectionState| {
                let interrupted = hook_queue.interrupt_all();
                if interrupted > 0 {
                    warn!(dir = %hook_dir, interrupted, "Session expired, lock waiters cancelled");
                }
            }),
        );

        info!(dir, "Lock initialized");
        Ok(Arc::new(Self {
            client,
            engine,
            dir: dir.to_string(),
            node_base: join_path(dir, node_prefix),
            queue,
            holders: Arc::new(DashMap::new()),
            destroyed: AtomicBool::new(false),
        }))
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn queue(&self) -> &LockQueue {
        &self.queue
    }

    pub fn holder(
        &self,
        owner: LockOwner,
    ) -> Option<ReentrantState> {
        self.holders
            .get(&owner)
            .filter(|entry| entry.acquired)
            .map(|entry| entry.value().clone())
    }

    async fn acquire(
        &self,
        owner: LockOwner,
        limit: Option<Duration>,
    ) -> Result<bool> {
        if self.is_destroyed() {
            return Err(Error::LockDestroyed(self.dir.clone()));
        }

        match self.holders.entry(owner) {
            Entry::Occupied(mut held) if held.get().acquired => {
                let held = held.get_mut();
                held.hold_count += 1;
                LOCK_ACQUISITIONS.with_label_values(&["reentrant"]).inc();
                trace!(dir = %self.dir, %owner, count = held.hold_count, "Reentrant acquisition");
                return Ok(true);
            }
            Entry::Occupied(_) => {
                debug!(dir = %self.dir, %owner, "Acquisition already in flight for owner");
                return Err(Error::AcquisitionInProgress {
                    dir: self.dir.clone(),
                    owner,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(ReentrantState {
                    node_path: String::new(),
                    hold_count: 0,
                    acquired: false,
                });
            }
        }

        // From here on the guard owns the reservation; a failed create or a
        // dropped future clears it.
        let mut pending = PendingAcquire {
            client: self.client.clone(),
            queue: self.queue.clone(),
            holders: self.holders.clone(),
            owner,
            node: None,
            armed: true,
        };

        let node_path = self
            .client
            .create(&self.node_base, Bytes::new(), CreateMode::EphemeralSequential)
            .await
            .map_err(|e| Error::operation("create", self.node_base.clone(), e))?;
        let name = last_segment(&node_path).to_string();
        if let Some(mut held) = self.holders.get_mut(&owner) {
            held.node_path = node_path.clone();
        }
        pending.node = Some((name.clone(), node_path.clone()));
        debug!(dir = %self.dir, node = %name, %owner, "Lock node created, waiting");

        let mut rx = self.queue.enqueue(&name, owner);

        let wakeup = match limit {
            None => Some((&mut rx).await),
            Some(limit) => tokio::time::timeout(limit, &mut rx).await.ok(),
        };
        pending.disarm();

        let wakeup = match wakeup {
            Some(received) => received.ok(),
            None => match self.queue.expire(&name, &mut rx) {
                Expiry::Withdrawn => {
                    self.abandon(owner, &node_path).await;
                    LOCK_ACQUISITIONS.with_label_values(&["timeout"]).inc();
                    debug!(dir = %self.dir, node = %name, %owner, "Lock wait timed out");
                    return Ok(false);
                }
                Expiry::Woken(wakeup) => {
                    trace!(dir = %self.dir, node = %name, %owner, "Wakeup arrived at the deadline");
                    wakeup
                }
            },
        };

        match wakeup {
            Some(Wakeup::Granted) => {
                if let Some(mut held) = self.holders.get_mut(&owner) {
                    held.acquired = true;
                    held.hold_count = 1;
                }
                LOCK_ACQUISITIONS.with_label_values(&["granted"]).inc();
                debug!(dir = %self.dir, node = %name, %owner, "Lock acquired");
                Ok(true)
            }
            Some(Wakeup::Cancelled) | None => {
                // The node went with the session; nothing to delete.
                self.holders.remove(&owner);
                LOCK_ACQUISITIONS.with_label_values(&["session_lost"]).inc();
                warn!(dir = %self.dir, node = %name, %owner, "Lock wait aborted by session loss");
                Err(Error::SessionLost { node_path })
            }
        }
    }

    /// Clear `owner` and delete its node, best effort.
    async fn abandon(
        &self,
        owner: LockOwner,
        node_path: &str,
    ) {
        self.holders.remove(&owner);
        match self.client.delete(node_path).await {
            Ok(()) | Err(ServiceError::NoNode(_)) => {}
            Err(e) => warn!(node = node_path, "Abandoned lock node not deleted: {}", e),
        }
    }
}

#[async_trait]
impl Lock for SimpleLock {
    async fn lock(
        &self,
        owner: LockOwner,
    ) -> Result<bool> {
        self.acquire(owner, None).await
    }

    async fn lock_with_timeout(
        &self,
        owner: LockOwner,
        timeout: Duration,
    ) -> Result<bool> {
        self.acquire(owner, Some(timeout)).await
    }

    async fn unlock(
        &self,
        owner: LockOwner,
    ) -> Result<()> {
        let node_path = {
            let Some(mut held) = self.holders.get_mut(&owner).filter(|held| held.acquired) else {
                debug!(dir = %self.dir, %owner, "Unlock without hold ignored");
                return Ok(());
            };
            held.hold_count -= 1;
            if held.hold_count > 0 {
                trace!(dir = %self.dir, %owner, count = held.hold_count, "Reentrant release");
                return Ok(());
            }
            held.node_path.clone()
        };
        self.holders.remove(&owner);

        match self.client.delete(&node_path).await {
            Ok(()) => {
                debug!(dir = %self.dir, node = %node_path, %owner, "Lock released");
                Ok(())
            }
            Err(ServiceError::NoNode(_)) => {
                debug!(node = %node_path, "Lock node already gone");
                Ok(())
            }
            Err(e) => Err(Error::operation("delete", node_path, e)),
        }
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.engine.unsubscribe(&self.dir, true, false);
        self.engine.remove_expiry_hook(&self.dir);
        info!(dir = %self.dir, "Lock destroyed");
    }
}

/// Cleanup for an acquisition whose future is dropped while parked
struct PendingAcquire {
    client: Arc<dyn CoordinationClient>,
    queue: Arc<LockQueue>,
    holders: Arc<DashMap<LockOwner, ReentrantState>>,
    owner: LockOwner,
    /// Queue name and full path, once the node exists
    node: Option<(String, String)>,
    armed: bool,
}

impl PendingAcquire {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingAcquire {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.holders.remove(&self.owner);
        let Some((name, node_path)) = self.node.take() else {
            return;
        };
        self.queue.withdraw(&name);

        let client = self.client.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match client.delete(&node_path).await {
                        Ok(()) | Err(ServiceError::NoNode(_)) => {
                            debug!(node = %node_path, "Abandoned lock node deleted")
                        }
                        Err(e) => warn!(node = %node_path, "Abandoned lock node not deleted: {}", e),
                    }
                });
            }
            Err(_) => warn!(node = %node_path, "No runtime to delete abandoned lock node"),
        }
    }
}
