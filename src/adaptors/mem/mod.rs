pub mod mem_coordination_service;

pub use mem_coordination_service::*;
