use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::adaptors::mem::MemoryCoordinationService;
use crate::adaptors::mem::MemorySession;
use crate::ConnectionState;
use crate::ConnectionStatus;
use crate::EventKind;
use crate::Listener;
use crate::SessionEvent;
use crate::StateListener;
use crate::SessionWatcher;
use crate::TriggerKind;
use crate::WatchEngine;
use crate::WatchEvent;

/// Listener that records every event it is handed
#[derive(Debug, Default, Clone)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<WatchEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WatchEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// `(path, kind)` pairs in arrival order
    pub fn changes(&self) -> Vec<(String, EventKind)> {
        self.events.lock().iter().map(|e| (e.path.clone(), e.kind)).collect()
    }
}

impl Listener for RecordingListener {
    fn on_event(
        &self,
        event: &WatchEvent,
    ) {
        self.events.lock().push(event.clone());
    }
}

/// State listener that records every state it is handed
#[derive(Debug, Default, Clone)]
pub struct RecordingStateListener {
    states: Arc<Mutex<Vec<ConnectionState>>>,
}

impl RecordingStateListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.states.lock().clone()
    }
}

impl StateListener for RecordingStateListener {
    fn on_state(
        &self,
        state: ConnectionState,
    ) {
        self.states.lock().push(state);
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until<F>(
    timeout: Duration,
    condition: F,
) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub struct EngineHarness {
    pub service: MemoryCoordinationService,
    pub session: Arc<MemorySession>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub engine: Arc<WatchEngine>,
}

impl EngineHarness {
    pub fn new() -> Self {
        let service = MemoryCoordinationService::new();
        let (session, events) = service.connect();
        let engine = Arc::new(WatchEngine::new(session.clone(), 2));
        Self {
            service,
            session,
            events,
            engine,
        }
    }

    /// Route every queued trigger into the engine; state events are dropped.
    pub async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if let SessionEvent::Trigger { path, kind } = event {
                let result = match kind {
                    TriggerKind::ChildrenChanged => self.engine.on_child_trigger(&path).await,
                    TriggerKind::DataChanged => self.engine.on_data_trigger(&path).await,
                };
                if let Err(e) = result {
                    panic!("trigger on {path} failed: {e}");
                }
            }
        }
    }
}

/// Session with its own engine and a running [`SessionWatcher`]
pub struct LiveSession {
    pub session: Arc<MemorySession>,
    pub engine: Arc<WatchEngine>,
    pub status: Arc<ConnectionStatus>,
    shutdown_tx: watch::Sender<()>,
}

impl LiveSession {
    pub async fn start(service: &MemoryCoordinationService) -> Self {
        let (session, events) = service.connect();
        let engine = Arc::new(WatchEngine::new(session.clone(), 2));
        let status = Arc::new(ConnectionStatus::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let watcher = SessionWatcher::new(
            session.clone(),
            engine.clone(),
            status.clone(),
            events,
            shutdown_rx,
        );
        tokio::spawn(watcher.run());
        assert!(status.wait_connected(Duration::from_secs(2)).await);

        Self {
            session,
            engine,
            status,
            shutdown_tx,
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}
