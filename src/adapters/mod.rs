//! Adapters for external systems: the SQLite store and the platform APIs.

pub mod platform;
pub mod sqlite;
