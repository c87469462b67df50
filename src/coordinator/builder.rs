use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::error;
use tracing::info;

use super::Coordinator;
use crate::ConnectionStatus;
use crate::CoordinationClient;
use crate::CoordinatorConfig;
use crate::Error;
use crate::LockRegistry;
use crate::Result;
use crate::SessionEvent;
use crate::SessionWatcher;
use crate::WatchEngine;

pub struct CoordinatorBuilder {
    client: Arc<dyn CoordinationClient>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    config: CoordinatorConfig,
}

impl CoordinatorBuilder {
    /// `events` must be the event stream of the session behind `client`.
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Self {
        Self {
            client,
            events,
            config: CoordinatorConfig::default(),
        }
    }

    /// How long `build` waits for the session to connect (default: 3s)
    pub fn connect_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.session.connect_timeout_ms =
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Listener worker threads (default: 2)
    pub fn listener_pool_size(
        mut self,
        size: usize,
    ) -> Self {
        self.config.watch.listener_pool_size = size;
        self
    }

    /// Name prefix of lock queue nodes (default: empty)
    pub fn lock_node_prefix(
        mut self,
        prefix: impl Into<String>,
    ) -> Self {
        self.config.lock.node_prefix = prefix.into();
        self
    }

    /// Completely replaces the configuration, discarding earlier setter calls.
    pub fn config(
        mut self,
        config: CoordinatorConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Start the session watcher and wait for the first connection.
    pub async fn build(self) -> Result<Coordinator> {
        let config = self.config.validate()?;
        let engine = Arc::new(WatchEngine::new(
            self.client.clone(),
            config.watch.listener_pool_size,
        ));
        let status = Arc::new(ConnectionStatus::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let watcher = SessionWatcher::new(
            self.client.clone(),
            engine.clone(),
            status.clone(),
            self.events,
            shutdown_rx,
        );
        let watcher_handle = tokio::spawn(watcher.run());

        let timeout = config.session.connect_timeout();
        if !status.wait_connected(timeout).await {
            error!(?timeout, "Coordination session did not connect");
            let _ = shutdown_tx.send(());
            engine.shutdown();
            return Err(Error::ConnectTimeout(timeout));
        }
        info!("Coordinator ready");

        let locks = LockRegistry::new(
            self.client.clone(),
            engine.clone(),
            config.lock.node_prefix.clone(),
        );
        Ok(Coordinator {
            client: self.client,
            engine,
            status,
            locks,
            shutdown_tx,
            watcher_handle: Mutex::new(Some(watcher_handle)),
            config,
        })
    }
}
