//! Persistence contract and implementations for the artifacts domain

pub mod batch;
pub mod gateway;
pub mod memory;

pub use batch::BatchUnit;
pub use gateway::{BatchEntry, EngineEvent, PersistenceGateway};
pub use memory::InMemoryGateway;
