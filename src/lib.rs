//! Client-side coordination primitives over a hierarchical coordination
//! service (ZooKeeper-style nodes, sessions and one-shot watches).
//!
//! - Durable child and data subscriptions with create/update/delete diffing
//! - Connection state callbacks and automatic session recovery
//! - "Stubborn" ephemeral nodes re-created after every recovery
//! - Fair, reentrant distributed locks over ephemeral sequential nodes
//!
//! The transport is abstracted by [`CoordinationClient`]; an in-process
//! implementation lives in [`adaptors::mem`].

pub mod adaptors;
mod client;
mod config;
mod coordinator;
mod errors;
mod lock;
mod metrics;
mod session;
pub mod utils;
mod watch;

pub use client::*;
pub use config::*;
pub use coordinator::*;
pub use errors::*;
pub use lock::*;
pub use metrics::gather_metrics;
pub use session::*;
pub use utils::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
