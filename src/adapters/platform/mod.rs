//! Platform collaborators: the credit ledger and the user directory.
//!
//! `HttpPlatformClient` talks to the platform API. The in-memory versions
//! back tests and local runs.

pub mod client;
pub mod memory;

pub use client::HttpPlatformClient;
pub use memory::{InMemoryCreditLedger, InMemoryUserDirectory, LedgerGrant};
