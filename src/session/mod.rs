//! Session event demultiplexing.
//!
//! A single [`SessionWatcher`] task consumes the client's serialized event
//! stream, keeps [`ConnectionStatus`] current and routes triggers into the
//! [`crate::WatchEngine`].

mod status;
mod watcher;

pub use status::*;
pub use watcher::*;

#[cfg(test)]
mod watcher_test;
