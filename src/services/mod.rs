//! Engine services.
//!
//! Pure evaluators (target, trigger, reward) and the stateful services built
//! on the ports: lifecycle, participation, scheduling and statistics.

pub mod activity_service;
pub mod engine;
pub mod participation_service;
pub mod reward_calculator;
pub mod scheduler_daemon;
pub mod scheduler_service;
pub mod statistics_service;
pub mod target_evaluator;
pub mod trigger_evaluator;

pub use activity_service::{ActivityService, ActivityUpdate};
pub use engine::ActivityEngine;
pub use participation_service::{ParticipationService, ReconcileReport};
pub use reward_calculator::calculate_reward;
pub use scheduler_daemon::{DaemonHandle, DaemonStatus, SchedulerDaemon, SchedulerDaemonConfig, SchedulerEvent, StopReason};
pub use scheduler_service::SchedulerService;
pub use statistics_service::StatisticsService;
pub use target_evaluator::{CustomPredicate, TargetEvaluator};
pub use trigger_evaluator::{is_triggered, EventOrigin};
