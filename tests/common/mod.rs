#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use d_coord::adaptors::mem::MemoryCoordinationService;
use d_coord::adaptors::mem::MemorySession;
use d_coord::Coordinator;
use d_coord::EventKind;
use d_coord::Listener;
use d_coord::WatchEvent;
use parking_lot::Mutex;

pub const WAIT: Duration = Duration::from_secs(3);

/// One participant: a coordinator over its own memory session
pub struct Participant {
    pub coord: Coordinator,
    pub session: Arc<MemorySession>,
}

pub async fn join(service: &MemoryCoordinationService) -> Participant {
    let (session, events) = service.connect();
    let coord = Coordinator::builder(session.clone(), events)
        .build()
        .await
        .expect("coordinator should connect");
    Participant { coord, session }
}

#[derive(Debug, Default, Clone)]
pub struct Recorder {
    events: Arc<Mutex<Vec<WatchEvent>>>,
}

impl Recorder {
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn changes(&self) -> Vec<(String, EventKind)> {
        self.events.lock().iter().map(|e| (e.path.clone(), e.kind)).collect()
    }
}

impl Listener for Recorder {
    fn on_event(
        &self,
        event: &WatchEvent,
    ) {
        self.events.lock().push(event.clone());
    }
}

pub async fn wait_until<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
