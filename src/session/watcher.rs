use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ConnectionStatus;
use crate::metrics::SESSION_STATE_TRANSITIONS;
use crate::ConnectionState;
use crate::CoordinationClient;
use crate::SessionEvent;
use crate::TriggerKind;
use crate::WatchEngine;

/// What the demultiplexer does with one raw event
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    /// `Connected` or `ConnectedReadOnly`
    Connected(ConnectionState),
    Disconnected,
    Expired,
    /// Any other state: forwarded to listeners only
    Forward(ConnectionState),
    ChildTrigger(String),
    DataTrigger(String),
}

pub(crate) fn classify(event: SessionEvent) -> Action {
    match event {
        SessionEvent::State(
            state @ (ConnectionState::Connected | ConnectionState::ConnectedReadOnly),
        ) => Action::Connected(state),
        SessionEvent::State(ConnectionState::Disconnected) => Action::Disconnected,
        SessionEvent::State(ConnectionState::Expired) => Action::Expired,
        SessionEvent::State(state) => Action::Forward(state),
        SessionEvent::Trigger {
            path,
            kind: TriggerKind::ChildrenChanged,
        } => Action::ChildTrigger(path),
        SessionEvent::Trigger {
            path,
            kind: TriggerKind::DataChanged,
        } => Action::DataTrigger(path),
    }
}

/// Single consumer of a session's raw event stream
pub struct SessionWatcher {
    client: Arc<dyn CoordinationClient>,
    engine: Arc<WatchEngine>,
    status: Arc<ConnectionStatus>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    shutdown: watch::Receiver<()>,
}

impl SessionWatcher {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        engine: Arc<WatchEngine>,
        status: Arc<ConnectionStatus>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            client,
            engine,
            status,
            events,
            shutdown,
        }
    }

    /// Process events until the stream ends or shutdown is signalled.
    pub async fn run(mut self) {
        info!("Session watcher started");

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            info!("Session event stream closed");
                            break;
                        }
                    }
                }

                _ = self.shutdown.changed() => {
                    info!("Session watcher shutting down");
                    break;
                }
            }
        }

        info!("Session watcher stopped");
    }

    pub(crate) async fn handle(
        &self,
        event: SessionEvent,
    ) {
        match classify(event) {
            Action::Connected(state) => {
                self.observe(state);
                if self.status.mark_connected() {
                    info!(state = state.as_str(), "Session connected");
                }
                self.engine.notify_state(state);
            }
            Action::Disconnected => {
                self.observe(ConnectionState::Disconnected);
                self.status.mark_disconnected();
                warn!("Session disconnected");
                self.engine.notify_state(ConnectionState::Disconnected);
            }
            Action::Expired => {
                self.observe(ConnectionState::Expired);
                self.status.mark_disconnected();
                warn!("Session expired, recovering");
                self.engine.notify_state(ConnectionState::Expired);
                self.spawn_recovery();
            }
            Action::Forward(state) => {
                self.observe(state);
                debug!(state = state.as_str(), "Session state change");
                self.engine.notify_state(state);
            }
            Action::ChildTrigger(path) => {
                if let Err(e) = self.engine.on_child_trigger(&path).await {
                    warn!(path, "Child change refresh failed: {}", e);
                }
            }
            Action::DataTrigger(path) => {
                if let Err(e) = self.engine.on_data_trigger(&path).await {
                    warn!(path, "Data change refresh failed: {}", e);
                }
            }
        }
    }

    fn observe(
        &self,
        state: ConnectionState,
    ) {
        SESSION_STATE_TRANSITIONS.with_label_values(&[state.as_str()]).inc();
    }

    /// Obtain a fresh session, then re-arm subscriptions and stubborn nodes.
    ///
    /// Runs detached; a failed attempt is logged and the next expiry starts
    /// over.
    fn spawn_recovery(&self) {
        let client = self.client.clone();
        let engine = self.engine.clone();
        tokio::spawn(async move {
            if let Err(e) = client.reconnect().await {
                error!("Session recovery failed to reconnect: {}", e);
                return;
            }
            match engine.on_reconnect_recovered().await {
                Ok(()) => info!("Session recovered"),
                Err(e) => error!("Session recovery incomplete: {}", e),
            }
        });
    }
}
