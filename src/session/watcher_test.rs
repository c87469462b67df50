use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tracing_test::traced_test;

use super::watcher::classify;
use super::watcher::Action;
use super::*;
use crate::adaptors::mem::MemoryCoordinationService;
use crate::test_utils::wait_until;
use crate::test_utils::RecordingListener;
use crate::test_utils::RecordingStateListener;
use crate::ChildInterest;
use crate::ConnectionState;
use crate::CoordinationClient;
use crate::CreateMode;
use crate::EventKind;
use crate::SessionEvent;
use crate::WatchEngine;

const WAIT: Duration = Duration::from_secs(2);

#[test]
fn test_classify_states_and_triggers() {
    assert_eq!(
        classify(SessionEvent::State(ConnectionState::ConnectedReadOnly)),
        Action::Connected(ConnectionState::ConnectedReadOnly)
    );
    assert_eq!(
        classify(SessionEvent::State(ConnectionState::Disconnected)),
        Action::Disconnected
    );
    assert_eq!(classify(SessionEvent::State(ConnectionState::Expired)), Action::Expired);
    assert_eq!(
        classify(SessionEvent::State(ConnectionState::AuthFailed)),
        Action::Forward(ConnectionState::AuthFailed)
    );
    assert_eq!(
        classify(SessionEvent::children_changed("/a")),
        Action::ChildTrigger("/a".to_string())
    );
    assert_eq!(
        classify(SessionEvent::data_changed("/a")),
        Action::DataTrigger("/a".to_string())
    );
}

#[tokio::test]
async fn test_status_gate_opens_and_closes() {
    let status = ConnectionStatus::new();
    assert!(!status.is_connected());
    assert!(!status.wait_connected(Duration::from_millis(10)).await);

    assert!(status.mark_connected());
    assert!(!status.mark_connected());
    assert!(status.wait_connected(Duration::from_millis(10)).await);

    assert!(status.mark_disconnected());
    assert!(!status.mark_disconnected());
    assert!(!status.is_connected());
}

struct Running {
    service: MemoryCoordinationService,
    session: Arc<crate::adaptors::mem::MemorySession>,
    engine: Arc<WatchEngine>,
    status: Arc<ConnectionStatus>,
    shutdown_tx: watch::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

fn start() -> Running {
    let service = MemoryCoordinationService::new();
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
    let handle = tokio::spawn(watcher.run());

    Running {
        service,
        session,
        engine,
        status,
        shutdown_tx,
        handle,
    }
}

#[tokio::test]
#[traced_test]
async fn test_watcher_tracks_connectivity_and_forwards_states() {
    let running = start();
    let disconnected = RecordingStateListener::new();
    running
        .engine
        .listen_state(ConnectionState::Disconnected, Arc::new(disconnected.clone()));

    assert!(running.status.wait_connected(WAIT).await);

    running.service.disconnect(&running.session);
    assert!(wait_until(WAIT, || !running.status.is_connected()).await);
    assert_eq!(disconnected.states(), vec![ConnectionState::Disconnected]);

    running.service.restore(&running.session);
    assert!(running.status.wait_connected(WAIT).await);
}

#[tokio::test]
async fn test_watcher_routes_child_triggers() {
    let running = start();
    assert!(running.status.wait_connected(WAIT).await);
    running.session.create("/w", Bytes::new(), CreateMode::Persistent).await.unwrap();

    let listener = RecordingListener::new();
    running
        .engine
        .subscribe_children("/w", Arc::new(listener.clone()), ChildInterest::nodes())
        .await
        .unwrap();
    running.session.create("/w/x", Bytes::new(), CreateMode::Persistent).await.unwrap();

    assert!(wait_until(WAIT, || listener.len() == 1).await);
    assert_eq!(listener.changes(), vec![("/w/x".to_string(), EventKind::Created)]);
}

#[tokio::test]
#[traced_test]
async fn test_expiry_triggers_recovery() {
    let running = start();
    assert!(running.status.wait_connected(WAIT).await);
    let expired = RecordingStateListener::new();
    running.engine.listen_state(ConnectionState::Expired, Arc::new(expired.clone()));

    running.session.create("/r", Bytes::new(), CreateMode::Ephemeral).await.unwrap();
    running.engine.register_stubborn("/r", Bytes::from_static(b"me")).unwrap();
    let before = running.session.id();

    running.service.expire_session(&running.session);

    assert!(wait_until(WAIT, || running.service.node_exists("/r")).await);
    assert_ne!(running.session.id(), before);
    assert_eq!(expired.states(), vec![ConnectionState::Expired]);
    assert!(running.status.wait_connected(WAIT).await);
    assert!(wait_until(WAIT, || logs_contain("Session recovered")).await);
}

#[tokio::test]
async fn test_watcher_stops_on_shutdown() {
    let running = start();
    running.shutdown_tx.send(()).unwrap();

    tokio::time::timeout(WAIT, running.handle).await.unwrap().unwrap();
}
