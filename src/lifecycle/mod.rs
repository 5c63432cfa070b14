//! Period and task lifecycle engine.
//!
//! Tasks move through a four-state board (`unassigned`, `todo`,
//! `in_progress`, `completed`) inside date-bounded performance periods.
//! Closing a period rolls unfinished tasks into its successor in a single
//! transaction, and every status change is kept in an append-only
//! transition log from which throughput, cycle time and utilization are
//! derived on demand. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
