//! Durable subscriptions over one-shot triggers.
//!
//! - [`WatchEngine`] keeps child, data and state subscriptions and re-arms
//!   the underlying trigger on every refresh
//! - [`ListenerPool`] runs subscriber callbacks on worker threads with
//!   per-path affinity
//! - [`Listener`] / [`StateListener`] are the callback seams

mod dispatch_pool;
mod engine;
mod listener;
mod subscription;

pub use dispatch_pool::*;
pub use engine::*;
pub use listener::*;
pub use subscription::*;
