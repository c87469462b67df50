//! Entry point tying the session, the watch engine and the locks together.
//!
//! ```ignore
//! let (session, events) = service.connect();
//! let coord = Coordinator::builder(session, events)
//!     .config(CoordinatorConfig::new()?.validate()?)
//!     .build()
//!     .await?;
//!
//! coord.listen_children("/services", |e: &WatchEvent| println!("{e:?}")).await?;
//! let lock = coord.lock("/locks/orders").await?;
//! ```

mod builder;
mod coordinator;

pub use builder::*;
pub use coordinator::*;

#[cfg(test)]
mod coordinator_test;
