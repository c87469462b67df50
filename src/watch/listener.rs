use bytes::Bytes;

use crate::ConnectionState;

/// Semantic change reported to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A child appeared under a watched parent
    Created,
    /// The payload of a watched node changed
    DataChanged,
    /// A child disappeared, or a watched node was removed
    Deleted,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::DataChanged => "data_changed",
            EventKind::Deleted => "deleted",
        }
    }
}

/// Change notification carrying the affected node path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Full path of the node the event is about
    pub path: String,
    pub kind: EventKind,
    /// Node payload; empty for deletions and structure-only subscriptions
    pub payload: Bytes,
}

impl WatchEvent {
    pub fn new(
        path: impl Into<String>,
        kind: EventKind,
        payload: Bytes,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            payload,
        }
    }
}

/// Subscriber callback for child and data changes
///
/// Invoked on a listener pool worker, except for the initial enumeration of
/// a child subscription which runs on the subscribing task.
pub trait Listener: Send + Sync + 'static {
    fn on_event(
        &self,
        event: &WatchEvent,
    );
}

impl<F> Listener for F
where
    F: Fn(&WatchEvent) + Send + Sync + 'static,
{
    fn on_event(
        &self,
        event: &WatchEvent,
    ) {
        self(event)
    }
}

/// Callback for connection state transitions
pub trait StateListener: Send + Sync + 'static {
    fn on_state(
        &self,
        state: ConnectionState,
    );
}

impl<F> StateListener for F
where
    F: Fn(ConnectionState) + Send + Sync + 'static,
{
    fn on_state(
        &self,
        state: ConnectionState,
    ) {
        self(state)
    }
}
