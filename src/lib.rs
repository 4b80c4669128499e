//! Activity Engine - reward campaigns for a learning platform
//!
//! Administrators define activities (daily check-ins, letter challenges,
//! streaks, scheduled drops) with typed target, trigger and reward rules.
//! The engine drives each activity through its lifecycle, evaluates user
//! events against active activities, disburses credits within a budget
//! that holds under concurrency, and runs recurring schedules.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, rule types, errors and port traits
//! - **Service Layer** (`services`): lifecycle, participation, scheduler, statistics
//! - **Adapters** (`adapters`): SQLite store and platform HTTP clients
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): admin command-line interface
//!
//! # Example
//!
//! ```ignore
//! use activity_engine::adapters::platform::{InMemoryCreditLedger, InMemoryUserDirectory};
//! use activity_engine::adapters::sqlite::create_migrated_test_pool;
//! use activity_engine::{ActivityEngine, Config};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = create_migrated_test_pool().await?;
//!     let engine = ActivityEngine::new(
//!         pool,
//!         Arc::new(InMemoryCreditLedger::new()),
//!         Arc::new(InMemoryUserDirectory::new()),
//!         &Config::default(),
//!     );
//!     engine.scheduler().tick(chrono::Utc::now()).await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult, LedgerError};
pub use domain::models::{
    Activity, ActivityKind, ActivityStatus, Config, ParticipationOutcome, ParticipationRejection,
    RepeatPattern, RewardRule, TargetRule, TriggerKind, TriggerRule,
};
pub use domain::ports::{CreditLedger, UserDirectory};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ActivityEngine, ActivityUpdate};
