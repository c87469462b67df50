use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::CoordinatorBuilder;
use crate::ensure_path;
use crate::parent_path;
use crate::ChildInterest;
use crate::ConnectionState;
use crate::ConnectionStatus;
use crate::CoordinationClient;
use crate::CoordinatorConfig;
use crate::CreateMode;
use crate::Error;
use crate::Listener;
use crate::LockRegistry;
use crate::Result;
use crate::SessionEvent;
use crate::SimpleLock;
use crate::StateListener;
use crate::WatchEngine;

/// Client-side coordination layer over one session
///
/// Offers durable subscriptions, stubborn nodes and FIFO locks on top of a
/// [`CoordinationClient`]. Dropping the coordinator stops its session
/// watcher; call [`Coordinator::close`] to also end the session.
pub struct Coordinator {
    pub(super) client: Arc<dyn CoordinationClient>,
    pub(super) engine: Arc<WatchEngine>,
    pub(super) status: Arc<ConnectionStatus>,
    pub(super) locks: LockRegistry,
    pub(super) shutdown_tx: watch::Sender<()>,
    pub(super) watcher_handle: Mutex<Option<JoinHandle<()>>>,
    pub(super) config: CoordinatorConfig,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("connected", &self.is_connected())
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn builder(
        client: Arc<dyn CoordinationClient>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder::new(client, events)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<WatchEngine> {
        &self.engine
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// Wait for connectivity; `false` if `timeout` elapsed first.
    pub async fn wait_connected(
        &self,
        timeout: Duration,
    ) -> bool {
        self.status.wait_connected(timeout).await
    }

    // --- node operations ---

    /// Create a node; returns its actual path.
    pub async fn create(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        mode: CreateMode,
    ) -> Result<String> {
        self.client
            .create(path, data.into(), mode)
            .await
            .map_err(|e| Error::operation("create", path, e))
    }

    /// Create a node, creating missing ancestors as empty persistent nodes.
    pub async fn create_recursive(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        mode: CreateMode,
    ) -> Result<String> {
        if let Some(parent) = parent_path(path).filter(|p| *p != "/") {
            ensure_path(self.client.as_ref(), parent)
                .await
                .map_err(|e| Error::operation("create", parent, e))?;
        }
        self.create(path, data, mode).await
    }

    pub async fn delete(
        &self,
        path: &str,
    ) -> Result<()> {
        self.client.delete(path).await.map_err(|e| Error::operation("delete", path, e))
    }

    pub async fn exists(
        &self,
        path: &str,
    ) -> Result<bool> {
        self.client.exists(path).await.map_err(|e| Error::operation("exists", path, e))
    }

    pub async fn get_data(
        &self,
        path: &str,
    ) -> Result<Bytes> {
        self.client
            .get_data(path, false)
            .await
            .map_err(|e| Error::operation("get_data", path, e))
    }

    pub async fn set_data(
        &self,
        path: &str,
        data: impl Into<Bytes>,
    ) -> Result<()> {
        self.client
            .set_data(path, data.into())
            .await
            .map_err(|e| Error::operation("set_data", path, e))
    }

    pub async fn get_children(
        &self,
        path: &str,
    ) -> Result<Vec<String>> {
        self.client
            .get_children(path, false)
            .await
            .map_err(|e| Error::operation("get_children", path, e))
    }

    // --- subscriptions ---

    /// Follow creations and deletions of the children of `path`.
    ///
    /// Existing children are reported as `Created` before this returns.
    pub async fn listen_children(
        &self,
        path: &str,
        listener: impl Listener,
    ) -> Result<()> {
        self.engine
            .subscribe_children(path, Arc::new(listener), ChildInterest::nodes())
            .await
    }

    /// Like [`Self::listen_children`], with payloads and per-child data changes.
    pub async fn listen_child_data(
        &self,
        path: &str,
        listener: impl Listener,
    ) -> Result<()> {
        self.engine
            .subscribe_children(path, Arc::new(listener), ChildInterest::with_data())
            .await
    }

    /// Follow the payload of `path`. The current payload is reported first.
    pub async fn listen_data(
        &self,
        path: &str,
        listener: impl Listener,
    ) -> Result<()> {
        self.engine.subscribe_data(path, Arc::new(listener)).await
    }

    pub fn unlisten_children(
        &self,
        path: &str,
    ) {
        self.engine.unsubscribe(path, true, false);
    }

    pub fn unlisten_child_data(
        &self,
        path: &str,
    ) {
        self.engine.unsubscribe(path, false, true);
    }

    pub fn unlisten_data(
        &self,
        path: &str,
    ) {
        self.engine.unsubscribe(path, false, false);
    }

    /// Register the callback for `state`, replacing any earlier one.
    pub fn listen_state(
        &self,
        state: ConnectionState,
        listener: impl StateListener,
    ) {
        self.engine.listen_state(state, Arc::new(listener));
    }

    pub fn unlisten_state(
        &self,
        state: ConnectionState,
    ) {
        self.engine.unlisten_state(state);
    }

    /// Create an ephemeral node that is re-created after every session
    /// recovery.
    pub async fn create_stubborn(
        &self,
        path: &str,
        data: impl Into<Bytes>,
    ) -> Result<String> {
        let data = data.into();
        self.engine.register_stubborn(path, data.clone())?;

        match self.create(path, data, CreateMode::Ephemeral).await {
            Ok(actual) => {
                debug!(path, "Stubborn node created");
                Ok(actual)
            }
            Err(e) => {
                self.engine.remove_stubborn(path);
                Err(e)
            }
        }
    }

    // --- locks ---

    /// Lock handle for the directory `path`, initialized on first use.
    pub async fn lock(
        &self,
        path: &str,
    ) -> Result<Arc<SimpleLock>> {
        self.locks.get_or_init(path).await
    }

    /// Initialize the lock for `path`; fails with
    /// [`Error::RepeatedInitialization`] if it is already live.
    pub async fn init_lock(
        &self,
        path: &str,
    ) -> Result<Arc<SimpleLock>> {
        self.locks.init(path).await
    }

    /// Stop event processing and end the session.
    pub async fn close(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        let handle = self.watcher_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Session watcher ended abnormally: {:?}", e);
            }
        }
        self.engine.shutdown();

        self.client
            .close()
            .await
            .map_err(|e| Error::operation("close", "/", e))?;
        info!("Coordinator closed");
        Ok(())
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}
