//! Coordination Layer Error Hierarchy
//!
//! Defines the error types surfaced by the watch engine, the session
//! demultiplexer and the distributed lock, categorized by the caller-visible
//! condition rather than by the component that produced it.

use std::time::Duration;

use config::ConfigError;

use crate::LockOwner;
use crate::ServiceError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any failed call against the coordination service
    #[error("Coordination service call `{op}` on {path} failed: {source}")]
    OperationFailed {
        op: &'static str,
        path: String,
        #[source]
        source: ServiceError,
    },

    /// A blocked lock waiter was cancelled because the session expired
    #[error("Session lost while waiting for lock node {node_path}")]
    SessionLost { node_path: String },

    /// Stubborn node registration with a missing or malformed argument
    #[error("Invalid stubborn node registration: {0}")]
    InvalidRegistration(String),

    /// Lock directory already configured; the existing handle stays valid
    #[error("Lock directory {0} is already initialized")]
    RepeatedInitialization(String),

    /// Acquisition attempted on a lock handle after `destroy`
    #[error("Lock {0} is destroyed")]
    LockDestroyed(String),

    /// The owner called `lock` again while its first attempt is still waiting
    #[error("{owner} is already waiting for lock {dir}")]
    AcquisitionInProgress { dir: String, owner: LockOwner },

    /// Startup gate never opened
    #[error("Coordination service not connected after {0:?}")]
    ConnectTimeout(Duration),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    pub(crate) fn operation(
        op: &'static str,
        path: impl Into<String>,
        source: ServiceError,
    ) -> Self {
        Error::OperationFailed {
            op,
            path: path.into(),
            source,
        }
    }

    /// True when the failure is the service reporting a missing node
    pub fn is_no_node(&self) -> bool {
        matches!(
            self,
            Error::OperationFailed {
                source: ServiceError::NoNode(_),
                ..
            }
        )
    }

    /// True when the error means an involuntary loss of the session
    pub fn is_session_lost(&self) -> bool {
        matches!(
            self,
            Error::SessionLost { .. }
                | Error::OperationFailed {
                    source: ServiceError::SessionExpired,
                    ..
                }
        )
    }
}
