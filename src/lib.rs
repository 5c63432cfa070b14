//! Kanban engine: performance periods and task lifecycle tracking.
//!
//! This crate keeps tasks on a four-state board inside date-bounded
//! performance periods, rolls unfinished work forward when a period closes
//! and derives throughput, cycle time and utilization from each task's
//! transition history.
//!
//! # Architecture
//!
//! The engine follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for persistence
//! - **Adapters**: In-memory and `SQLite` implementations of the ports
//! - **Services**: Period management, task control, metrics and the engine
//!   facade
//!
//! # Modules
//!
//! - [`lifecycle`]: Periods, tasks, transition logs and metrics
//! - [`config`]: TOML configuration for the store and logging
//! - [`telemetry`]: Tracing subscriber setup

pub mod config;
pub mod lifecycle;
pub mod telemetry;
