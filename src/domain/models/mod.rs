//! Domain models for the activity engine.

pub mod activity;
pub mod activity_log;
pub mod config;
pub mod participation;
pub mod rules;
pub mod schedule;
pub mod statistics;
pub mod user;

pub use activity::{Activity, ActivityKind, ActivityStatus, RepeatPattern, RewardCap};
pub use activity_log::{ActivityAction, ActivityLog, PendingReward};
pub use config::{
    Config, DatabaseConfig, EngineConfig, LoggingConfig, PlatformConfig, SchedulerConfig,
};
pub use participation::{
    EventPayload, Participation, ParticipationAggregate, ParticipationOutcome,
    ParticipationRejection,
};
pub use rules::{RewardRule, TargetRule, TriggerKind, TriggerRule};
pub use schedule::{ActivitySchedule, ScheduleStatus, TickReport};
pub use statistics::ActivityStatistics;
pub use user::{UserProfile, UserQuery};
