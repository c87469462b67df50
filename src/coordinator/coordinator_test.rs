use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing_test::traced_test;

use super::*;
use crate::adaptors::mem::MemoryCoordinationService;
use crate::adaptors::mem::MemorySession;
use crate::test_utils::wait_until;
use crate::test_utils::RecordingListener;
use crate::test_utils::RecordingStateListener;
use crate::ConnectionState;
use crate::CoordinatorConfig;
use crate::CreateMode;
use crate::Error;
use crate::EventKind;
use crate::Lock;
use crate::LockOwner;
use crate::MockCoordinationClient;

const WAIT: Duration = Duration::from_secs(2);

async fn connect(service: &MemoryCoordinationService) -> (Coordinator, Arc<MemorySession>) {
    let (session, events) = service.connect();
    let coord = Coordinator::builder(session.clone(), events).build().await.unwrap();
    (coord, session)
}

#[tokio::test]
async fn test_build_waits_for_connection() {
    let service = MemoryCoordinationService::new();
    let (coord, _session) = connect(&service).await;

    assert!(coord.is_connected());
    assert_eq!(coord.config().watch.listener_pool_size, 2);
}

#[tokio::test]
#[traced_test]
async fn test_build_times_out_without_connected_event() {
    let (_events_tx, events_rx) = mpsc::unbounded_channel();

    let result = Coordinator::builder(Arc::new(MockCoordinationClient::new()), events_rx)
        .connect_timeout(Duration::from_millis(50))
        .build()
        .await;

    assert!(matches!(result, Err(Error::ConnectTimeout(t)) if t == Duration::from_millis(50)));
    assert!(logs_contain("Coordination session did not connect"));
}

#[tokio::test]
async fn test_connect_timeout_saturates_instead_of_truncating() {
    let service = MemoryCoordinationService::new();
    let (session, events) = service.connect();

    let coord = Coordinator::builder(session, events)
        .connect_timeout(Duration::MAX)
        .build()
        .await
        .unwrap();

    assert_eq!(coord.config().session.connect_timeout_ms, u64::MAX);
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let service = MemoryCoordinationService::new();
    let (session, events) = service.connect();

    let mut config = CoordinatorConfig::default();
    config.watch.listener_pool_size = 0;
    let result = Coordinator::builder(session, events).config(config).build().await;

    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_node_operations_pass_through() {
    let service = MemoryCoordinationService::new();
    let (coord, _session) = connect(&service).await;

    let path = coord
        .create_recursive("/app/config/db", "url", CreateMode::Persistent)
        .await
        .unwrap();
    assert_eq!(path, "/app/config/db");
    assert!(coord.exists("/app/config").await.unwrap());
    assert_eq!(coord.get_data("/app/config/db").await.unwrap(), Bytes::from_static(b"url"));

    coord.set_data("/app/config/db", "url2").await.unwrap();
    assert_eq!(service.data_of("/app/config/db"), Some(Bytes::from_static(b"url2")));
    assert_eq!(coord.get_children("/app/config").await.unwrap(), vec!["db".to_string()]);

    let err = coord.delete("/app/missing").await.unwrap_err();
    assert!(err.is_no_node());
    let err = coord.create("/app", Bytes::new(), CreateMode::Persistent).await.unwrap_err();
    assert!(matches!(err, Error::OperationFailed { op: "create", .. }));
}

#[tokio::test]
async fn test_listen_children_reports_external_creation() {
    let service = MemoryCoordinationService::new();
    let (coord, _session) = connect(&service).await;
    let (other, _other_events) = service.connect();
    coord.create("/a", Bytes::new(), CreateMode::Persistent).await.unwrap();

    let listener = RecordingListener::new();
    coord.listen_children("/a", listener.clone()).await.unwrap();
    crate::CoordinationClient::create(other.as_ref(), "/a/x", Bytes::new(), CreateMode::Persistent)
        .await
        .unwrap();

    assert!(wait_until(WAIT, || listener.len() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(listener.changes(), vec![("/a/x".to_string(), EventKind::Created)]);

    coord.unlisten_children("/a");
    assert_eq!(coord.engine().child_subscription_count(), 0);
}

#[tokio::test]
async fn test_listen_data_and_child_data() {
    let service = MemoryCoordinationService::new();
    let (coord, _session) = connect(&service).await;
    coord.create_recursive("/cfg/a", "1", CreateMode::Persistent).await.unwrap();

    let data = RecordingListener::new();
    coord.listen_data("/cfg/a", data.clone()).await.unwrap();
    let children = RecordingListener::new();
    coord.listen_child_data("/cfg", children.clone()).await.unwrap();

    coord.set_data("/cfg/a", "2").await.unwrap();

    assert!(wait_until(WAIT, || data.len() == 2).await);
    assert_eq!(data.events()[1].payload, Bytes::from_static(b"2"));
    assert_eq!(children.events()[0].payload, Bytes::from_static(b"1"));

    coord.unlisten_child_data("/cfg");
    coord.unlisten_data("/cfg/a");
    assert_eq!(coord.engine().data_subscription_count(), 0);
}

#[tokio::test]
#[traced_test]
async fn test_stubborn_node_survives_expiry() {
    let service = MemoryCoordinationService::new();
    let (coord, session) = connect(&service).await;
    coord.create("/members", Bytes::new(), CreateMode::Persistent).await.unwrap();

    coord.create_stubborn("/members/me", "10.0.0.1").await.unwrap();
    service.expire_session(&session);

    assert!(wait_until(WAIT, || service.node_exists("/members/me")).await);
    assert_eq!(service.data_of("/members/me"), Some(Bytes::from_static(b"10.0.0.1")));
    assert!(coord.wait_connected(WAIT).await);
}

#[tokio::test]
async fn test_create_stubborn_failures_leave_no_registration() {
    let service = MemoryCoordinationService::new();
    let (coord, _session) = connect(&service).await;

    let invalid = coord.create_stubborn("relative", "x").await;
    assert!(matches!(invalid, Err(Error::InvalidRegistration(_))));

    let no_parent = coord.create_stubborn("/nope/me", "x").await;
    assert!(no_parent.unwrap_err().is_no_node());
    assert!(coord.engine().stubborn_nodes().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_lock_handle_is_shared_per_directory() {
    let service = MemoryCoordinationService::new();
    let (coord, _session) = connect(&service).await;

    let first = coord.lock("/locks/a").await.unwrap();
    let second = coord.lock("/locks/a").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(logs_contain("Repeated lock initialization"));
    assert!(matches!(
        coord.init_lock("/locks/a").await,
        Err(Error::RepeatedInitialization(_))
    ));

    let owner = LockOwner::new();
    assert!(first.lock(owner).await.unwrap());
    first.unlock(owner).await.unwrap();
}

#[tokio::test]
async fn test_state_listener_sees_disconnect() {
    let service = MemoryCoordinationService::new();
    let (coord, session) = connect(&service).await;
    let states = RecordingStateListener::new();
    coord.listen_state(ConnectionState::Disconnected, states.clone());

    service.disconnect(&session);
    assert!(wait_until(WAIT, || states.states().len() == 1).await);
    assert!(!coord.is_connected());

    service.restore(&session);
    assert!(coord.wait_connected(WAIT).await);

    coord.unlisten_state(ConnectionState::Disconnected);
    service.disconnect(&session);
    assert!(wait_until(WAIT, || !coord.is_connected()).await);
    assert_eq!(states.states().len(), 1);
}

#[tokio::test]
async fn test_close_ends_session() {
    let service = MemoryCoordinationService::new();
    let (coord, _session) = connect(&service).await;
    coord.create("/eph", Bytes::new(), CreateMode::Ephemeral).await.unwrap();

    coord.close().await.unwrap();

    assert!(!service.node_exists("/eph"));
}
