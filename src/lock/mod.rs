//! Distributed FIFO lock over ephemeral sequential nodes.
//!
//! ```text
//! /locks/orders               lock directory (persistent)
//!   ├── 0000000007            held       <- minimum sequence
//!   ├── 0000000009            waiting
//!   └── 0000000012            waiting
//! ```
//!
//! Each acquirer creates one node and waits until it is the minimum of the
//! directory by [`crate::compare_sequence`]. The directory is followed through
//! a child subscription on the [`crate::WatchEngine`]; the lock never polls.

mod owner;
mod queue;
mod registry;
mod simple_lock;

pub use owner::*;
pub use queue::*;
pub use registry::*;
pub use simple_lock::*;

#[cfg(test)]
mod queue_test;
