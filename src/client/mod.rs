//! Coordination service facade
//!
//! The coordination layer never talks to the wire itself. Everything it needs
//! from the remote hierarchical service is expressed here:
//! - [`CoordinationClient`] - node CRUD, one-shot watch arming, session renewal
//! - [`SessionEvent`] - the single serialized stream of raw session/trigger events
//! - [`CreateMode`] / [`ServiceError`] - the vocabulary both sides share
//!
//! A concrete transport implements [`CoordinationClient`] and hands its event
//! receiver to [`crate::Coordinator::builder`]. The crate ships an in-process
//! implementation in [`crate::adaptors::mem`].

mod coordination_client;
mod event;
mod types;

pub use coordination_client::*;
pub use event::*;
pub use types::*;
