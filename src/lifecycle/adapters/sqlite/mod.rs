//! `SQLite` adapters for durable lifecycle persistence.

mod models;
mod schema;
mod store;

pub use store::{LifecycleSqlitePool, SqliteLifecycleStore};
