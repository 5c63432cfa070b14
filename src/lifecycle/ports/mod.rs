//! Port contracts for the lifecycle engine.
//!
//! Ports define infrastructure-agnostic interfaces used by lifecycle
//! services.

pub mod store;

pub use store::{LifecycleStore, StoreError, StoreReader, StoreResult, StoreWriter, TaskFilter};
