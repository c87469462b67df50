//! Concrete [`crate::CoordinationClient`] implementations.

pub mod mem;
