//! Engine facade wiring the SQLite store and platform collaborators into the
//! services.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::adapters::sqlite::{
    SqliteActivityLogRepository, SqliteActivityRepository, SqliteParticipationRepository,
    SqliteScheduleRepository, SqliteStatisticsRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::{
    ActivityLogRepository, ActivityRepository, CreditLedger, ParticipationRepository, ScheduleRepository,
    UserDirectory,
};
use crate::services::activity_service::ActivityService;
use crate::services::participation_service::ParticipationService;
use crate::services::scheduler_daemon::{SchedulerDaemon, SchedulerDaemonConfig};
use crate::services::scheduler_service::SchedulerService;
use crate::services::statistics_service::StatisticsService;
use crate::services::target_evaluator::TargetEvaluator;

/// All engine services over one database.
#[derive(Clone)]
pub struct ActivityEngine {
    activities: Arc<ActivityService>,
    participation: Arc<ParticipationService>,
    scheduler: Arc<SchedulerService>,
    statistics: Arc<StatisticsService>,
    schedules: Arc<dyn ScheduleRepository>,
    participations: Arc<dyn ParticipationRepository>,
    logs: Arc<dyn ActivityLogRepository>,
}

impl ActivityEngine {
    pub fn new(
        pool: SqlitePool,
        ledger: Arc<dyn CreditLedger>,
        users: Arc<dyn UserDirectory>,
        config: &Config,
    ) -> Self {
        let targets = TargetEvaluator::new(config.engine.new_user_window_days);
        Self::with_targets(pool, ledger, users, targets, config)
    }

    /// Like [`ActivityEngine::new`], with custom target predicates registered.
    pub fn with_targets(
        pool: SqlitePool,
        ledger: Arc<dyn CreditLedger>,
        users: Arc<dyn UserDirectory>,
        targets: TargetEvaluator,
        config: &Config,
    ) -> Self {
        let activity_repo: Arc<dyn ActivityRepository> = Arc::new(SqliteActivityRepository::new(pool.clone()));
        let participations: Arc<dyn ParticipationRepository> =
            Arc::new(SqliteParticipationRepository::new(pool.clone()));
        let schedules: Arc<dyn ScheduleRepository> = Arc::new(SqliteScheduleRepository::new(pool.clone()));
        let logs: Arc<dyn ActivityLogRepository> = Arc::new(SqliteActivityLogRepository::new(pool.clone()));
        let targets = Arc::new(targets);

        let statistics = Arc::new(StatisticsService::new(
            activity_repo.clone(),
            participations.clone(),
            Arc::new(SqliteStatisticsRepository::new(pool)),
            config.engine.statistics_staleness_secs,
        ));
        let activities = Arc::new(ActivityService::new(
            activity_repo.clone(),
            schedules.clone(),
            logs.clone(),
            statistics.clone(),
        ));
        let participation = Arc::new(ParticipationService::new(
            activity_repo.clone(),
            participations.clone(),
            logs.clone(),
            ledger,
            users.clone(),
            targets.clone(),
            config.engine.clone(),
        ));
        let scheduler = Arc::new(SchedulerService::new(
            activity_repo,
            schedules.clone(),
            logs.clone(),
            users,
            activities.clone(),
            participation.clone(),
            targets,
            config.scheduler.clone(),
        ));

        Self {
            activities,
            participation,
            scheduler,
            statistics,
            schedules,
            participations,
            logs,
        }
    }

    pub fn activities(&self) -> &ActivityService {
        &self.activities
    }

    pub fn participation(&self) -> &ParticipationService {
        &self.participation
    }

    pub fn scheduler(&self) -> &SchedulerService {
        &self.scheduler
    }

    pub fn statistics(&self) -> &StatisticsService {
        &self.statistics
    }

    pub fn schedules(&self) -> &dyn ScheduleRepository {
        self.schedules.as_ref()
    }

    pub fn participations(&self) -> &dyn ParticipationRepository {
        self.participations.as_ref()
    }

    pub fn logs(&self) -> &dyn ActivityLogRepository {
        self.logs.as_ref()
    }

    /// Background daemon ticking this engine's scheduler.
    pub fn daemon(&self) -> SchedulerDaemon {
        SchedulerDaemon::new(
            self.scheduler.clone(),
            SchedulerDaemonConfig::from(self.scheduler.config()),
        )
    }
}
