//! Domain layer for the activity engine
//!
//! This module contains core business logic, domain models and the port
//! traits that adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, LedgerError};
