//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that adapters implement:
//! - Repositories for activities, participations, schedules, statistics and logs
//! - CreditLedger: external credit disbursement
//! - UserDirectory: external user profiles
//!
//! The engine receives every port explicitly at construction time.

pub mod activity_log_repository;
pub mod activity_repository;
pub mod credit_ledger;
pub mod participation_repository;
pub mod schedule_repository;
pub mod statistics_repository;
pub mod user_directory;

pub use activity_log_repository::{ActivityLogFilter, ActivityLogRepository};
pub use activity_repository::{ActivityFilter, ActivityRepository};
pub use credit_ledger::CreditLedger;
pub use participation_repository::{ParticipationRepository, ParticipationUnit};
pub use schedule_repository::{ScheduleFilter, ScheduleRepository};
pub use statistics_repository::StatisticsRepository;
pub use user_directory::UserDirectory;
