use serde::Deserialize;
use serde::Serialize;

/// CreateMode value determines how a node is created on the coordination service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateMode {
    /// The node survives the creating session.
    Persistent,
    /// The node is removed when the creating session ends.
    Ephemeral,
    /// Persistent, with a monotonically increasing 10-digit suffix appended to the name.
    PersistentSequential,
    /// Ephemeral, with a monotonically increasing 10-digit suffix appended to the name.
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Failures reported by the coordination service facade
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Node does not exist: {0}")]
    NoNode(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Node has children: {0}")]
    NotEmpty(String),

    #[error("Connection to the coordination service lost")]
    ConnectionLoss,

    #[error("Session expired")]
    SessionExpired,

    #[error("{0}")]
    Other(String),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
