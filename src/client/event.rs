use serde::Deserialize;
use serde::Serialize;

/// Session connection states reported by the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    ConnectedReadOnly,
    Disconnected,
    Expired,
    AuthFailed,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::ConnectedReadOnly => "connected_read_only",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Expired => "expired",
            ConnectionState::AuthFailed => "auth_failed",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Kind of a fired one-shot watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    /// The child list of the watched node may have changed
    ChildrenChanged,
    /// The payload of the watched node changed, or the node was deleted
    DataChanged,
}

/// Raw event delivered by the coordination client, one at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    State(ConnectionState),
    Trigger { path: String, kind: TriggerKind },
}

impl SessionEvent {
    pub fn children_changed(path: impl Into<String>) -> Self {
        SessionEvent::Trigger {
            path: path.into(),
            kind: TriggerKind::ChildrenChanged,
        }
    }

    pub fn data_changed(path: impl Into<String>) -> Self {
        SessionEvent::Trigger {
            path: path.into(),
            kind: TriggerKind::DataChanged,
        }
    }
}
