//! Scheduler: time-driven activation, schedule execution, recurrence and expiry.
//!
//! A tick runs four passes in a fixed order:
//! 1. recover schedules stuck in `executing`
//! 2. start pending activities whose start time has come
//! 3. run due schedules (claimed with a compare-and-set)
//! 4. complete activities past their end time
//!
//! Recurring occurrences are computed from the activity's `start_time`, so a
//! late or missed tick never shifts the time of day of later occurrences.

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Activity, ActivityAction, ActivityLog, ActivitySchedule, ParticipationOutcome, SchedulerConfig, TickReport,
    TriggerKind, UserProfile,
};
use crate::domain::ports::{ActivityLogRepository, ActivityRepository, ScheduleRepository, UserDirectory};
use crate::services::activity_service::ActivityService;
use crate::services::participation_service::ParticipationService;
use crate::services::target_evaluator::TargetEvaluator;

const INTERRUPTED: &str = "execution interrupted";

/// Users participated concurrently during one scheduled fan-out.
const FANOUT_CONCURRENCY: usize = 8;

pub struct SchedulerService {
    activities: Arc<dyn ActivityRepository>,
    schedules: Arc<dyn ScheduleRepository>,
    logs: Arc<dyn ActivityLogRepository>,
    users: Arc<dyn UserDirectory>,
    lifecycle: Arc<ActivityService>,
    participation: Arc<ParticipationService>,
    targets: Arc<TargetEvaluator>,
    config: SchedulerConfig,
}

impl SchedulerService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        schedules: Arc<dyn ScheduleRepository>,
        logs: Arc<dyn ActivityLogRepository>,
        users: Arc<dyn UserDirectory>,
        lifecycle: Arc<ActivityService>,
        participation: Arc<ParticipationService>,
        targets: Arc<TargetEvaluator>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            activities,
            schedules,
            logs,
            users,
            lifecycle,
            participation,
            targets,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one full scheduler pass at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> DomainResult<TickReport> {
        let mut report = self.recover_stale_schedules(now).await?;
        report.absorb(self.activate_due_activities(now).await?);
        report.absorb(self.process_due_schedules(now).await?);
        report.absorb(self.complete_expired_activities(now).await?);

        if report.is_idle() {
            debug!("scheduler tick: nothing to do");
        } else {
            info!(
                recovered = report.recovered,
                activated = report.activated,
                executed = report.executed,
                failed = report.failed,
                regenerated = report.regenerated,
                participations = report.participations,
                expired = report.expired,
                "scheduler tick"
            );
        }
        Ok(report)
    }

    /// Fail schedules left `executing` past the grace period, e.g. by a crash.
    pub async fn recover_stale_schedules(&self, now: DateTime<Utc>) -> DomainResult<TickReport> {
        let grace = Duration::seconds(self.config.executing_grace_secs.min(i64::MAX as u64 / 1000) as i64);
        let stale = self.schedules.list_stale_executing(now - grace).await?;

        let mut report = TickReport::default();
        for schedule in stale {
            warn!(schedule_id = %schedule.id, activity_id = %schedule.activity_id, "recovering interrupted schedule");
            self.schedules.mark_failed(schedule.id, now, INTERRUPTED).await?;
            self.log_schedule(&schedule, ActivityAction::ScheduleFailed, json!({ "error": INTERRUPTED }), now)
                .await?;
            report.recovered += 1;

            if let Some(activity) = self.live_activity(&schedule).await? {
                if self.regenerate(&activity, &schedule).await? {
                    report.regenerated += 1;
                }
            }
        }
        Ok(report)
    }

    /// Start every pending activity whose start time has arrived.
    pub async fn activate_due_activities(&self, now: DateTime<Utc>) -> DomainResult<TickReport> {
        let mut report = TickReport::default();
        for activity in self.activities.list_due_to_start(now).await? {
            match self.lifecycle.start(activity.id, now).await {
                Ok(_) => report.activated += 1,
                Err(e) => warn!(activity_id = %activity.id, error = %e, "could not start activity"),
            }
        }
        Ok(report)
    }

    /// Execute every pending schedule due at `now`.
    pub async fn process_due_schedules(&self, now: DateTime<Utc>) -> DomainResult<TickReport> {
        let mut report = TickReport::default();

        for schedule in self.schedules.list_due(now).await? {
            if !self.schedules.claim(schedule.id, now).await? {
                debug!(schedule_id = %schedule.id, "schedule already claimed");
                continue;
            }

            let Some(activity) = self.live_activity(&schedule).await? else {
                let reason = "activity is gone or finished";
                self.schedules.mark_failed(schedule.id, now, reason).await?;
                self.log_schedule(&schedule, ActivityAction::ScheduleFailed, json!({ "error": reason }), now)
                    .await?;
                report.failed += 1;
                continue;
            };

            match self.execute(&activity, now).await {
                Ok(participations) => {
                    self.schedules.mark_completed(schedule.id, now).await?;
                    self.log_schedule(
                        &schedule,
                        ActivityAction::ScheduleExecuted,
                        json!({ "participations": participations }),
                        now,
                    )
                    .await?;
                    report.executed += 1;
                    report.participations += participations;
                }
                Err(e) => {
                    warn!(schedule_id = %schedule.id, activity_id = %activity.id, error = %e, "schedule failed");
                    let message = e.to_string();
                    self.schedules.mark_failed(schedule.id, now, &message).await?;
                    self.log_schedule(&schedule, ActivityAction::ScheduleFailed, json!({ "error": message }), now)
                        .await?;
                    report.failed += 1;
                }
            }

            if self.regenerate(&activity, &schedule).await? {
                report.regenerated += 1;
            }
        }
        Ok(report)
    }

    /// Complete active or paused activities whose end time has passed.
    pub async fn complete_expired_activities(&self, now: DateTime<Utc>) -> DomainResult<TickReport> {
        let mut report = TickReport::default();
        for activity in self.activities.list_expired(now).await? {
            match self.lifecycle.complete(activity.id, now).await {
                Ok(_) => report.expired += 1,
                Err(e) => warn!(activity_id = %activity.id, error = %e, "could not complete activity"),
            }
        }
        Ok(report)
    }

    /// Fan a scheduled occurrence out to every eligible user. Returns the
    /// number of participations recorded.
    async fn execute(&self, activity: &Activity, now: DateTime<Utc>) -> DomainResult<usize> {
        if activity.trigger_kind() != TriggerKind::Scheduled {
            return Ok(0);
        }
        if !activity.is_active_at(now) {
            debug!(activity_id = %activity.id, status = %activity.status, "activity not active; skipping fan-out");
            return Ok(0);
        }

        let query = self.targets.user_query(&activity.target_rule, now);
        let users = self.users.list_users(&query).await?;

        // Boxed so the fan-out stays `Send` when the tick runs on a spawned task.
        let fanout: Vec<BoxFuture<'_, (&UserProfile, DomainResult<ParticipationOutcome>)>> = users
            .iter()
            .map(|user| {
                async move {
                    let result = self.participation.participate_scheduled(activity, user, now).await;
                    (user, result)
                }
                .boxed()
            })
            .collect();
        let results: Vec<_> = stream::iter(fanout)
            .buffer_unordered(FANOUT_CONCURRENCY)
            .collect()
            .await;

        let mut recorded = 0;
        for (user, result) in results {
            match result {
                Ok(ParticipationOutcome::Rejected { .. }) => {}
                Ok(_) => recorded += 1,
                Err(e) => warn!(activity_id = %activity.id, user_id = %user.id, error = %e, "scheduled participation failed"),
            }
        }
        info!(activity_id = %activity.id, users = users.len(), recorded, "scheduled fan-out done");
        Ok(recorded)
    }

    /// Insert the occurrence after `schedule` if the activity still repeats.
    async fn regenerate(&self, activity: &Activity, schedule: &ActivitySchedule) -> DomainResult<bool> {
        let Some(next) = activity
            .repeat_pattern
            .next_after(activity.start_time, schedule.scheduled_time)
        else {
            return Ok(false);
        };
        if activity.repeat_end_date.is_some_and(|until| next >= until) || next > activity.end_time {
            debug!(activity_id = %activity.id, "recurrence finished");
            return Ok(false);
        }

        let created = self.schedules.create(&ActivitySchedule::new(activity.id, next)).await?;
        if created {
            debug!(activity_id = %activity.id, next = %next, "next occurrence scheduled");
        }
        Ok(created)
    }

    /// The schedule's activity, unless it was deleted or has finished.
    async fn live_activity(&self, schedule: &ActivitySchedule) -> DomainResult<Option<Activity>> {
        Ok(self
            .activities
            .get(schedule.activity_id)
            .await?
            .filter(|a| !a.is_deleted() && !a.status.is_terminal()))
    }

    async fn log_schedule(
        &self,
        schedule: &ActivitySchedule,
        action: ActivityAction,
        details: serde_json::Value,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut details = details;
        if let Some(map) = details.as_object_mut() {
            map.insert("schedule_id".to_string(), json!(schedule.id.to_string()));
            map.insert("scheduled_time".to_string(), json!(schedule.scheduled_time.to_rfc3339()));
        }
        self.logs
            .append(&ActivityLog::new(schedule.activity_id, action, details).at(now))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::platform::{InMemoryCreditLedger, InMemoryUserDirectory};
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteActivityLogRepository, SqliteActivityRepository,
        SqliteParticipationRepository, SqliteScheduleRepository, SqliteStatisticsRepository,
    };
    use crate::domain::models::{
        ActivityStatus, EngineConfig, RepeatPattern, RewardRule, ScheduleStatus, TriggerRule, UserProfile,
    };
    use crate::domain::ports::ScheduleFilter;
    use crate::services::statistics_service::StatisticsService;
    use chrono::TimeZone;

    struct Fixture {
        scheduler: SchedulerService,
        lifecycle: Arc<ActivityService>,
        activities: Arc<SqliteActivityRepository>,
        schedules: Arc<SqliteScheduleRepository>,
        ledger: Arc<InMemoryCreditLedger>,
    }

    async fn setup() -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let activities = Arc::new(SqliteActivityRepository::new(pool.clone()));
        let participations = Arc::new(SqliteParticipationRepository::new(pool.clone()));
        let schedules = Arc::new(SqliteScheduleRepository::new(pool.clone()));
        let logs = Arc::new(SqliteActivityLogRepository::new(pool.clone()));
        let statistics = Arc::new(StatisticsService::new(
            activities.clone(),
            participations.clone(),
            Arc::new(SqliteStatisticsRepository::new(pool)),
            3600,
        ));
        let ledger = Arc::new(InMemoryCreditLedger::new());
        let users = Arc::new(InMemoryUserDirectory::with_users(vec![
            UserProfile::new("u-1", day(1) - Duration::days(90)),
            UserProfile::new("u-2", day(1) - Duration::days(90)),
        ]));
        let targets = Arc::new(TargetEvaluator::default());
        let lifecycle = Arc::new(ActivityService::new(
            activities.clone(),
            schedules.clone(),
            logs.clone(),
            statistics,
        ));
        let participation = Arc::new(ParticipationService::new(
            activities.clone(),
            participations,
            logs.clone(),
            ledger.clone(),
            users.clone(),
            targets.clone(),
            EngineConfig::default(),
        ));
        let scheduler = SchedulerService::new(
            activities.clone(),
            schedules.clone(),
            logs,
            users,
            lifecycle.clone(),
            participation,
            targets,
            SchedulerConfig::default(),
        );
        Fixture {
            scheduler,
            lifecycle,
            activities,
            schedules,
            ledger,
        }
    }

    fn day(n: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, n, 9, 0, 0).unwrap()
    }

    async fn publish_daily_drop(fx: &Fixture) -> Activity {
        let drop = Activity::new("Daily drop", TriggerRule::Scheduled, RewardRule::fixed(5), day(1), day(20))
            .with_repeat(RepeatPattern::Daily, Some(day(4)))
            .with_max_rewards_per_user(0);
        let created = fx.lifecycle.create(drop, day(1) - Duration::days(1)).await.unwrap();
        fx.lifecycle.publish(created.id, day(1) - Duration::days(1)).await.unwrap()
    }

    async fn schedules_of(fx: &Fixture, activity: &Activity) -> Vec<ActivitySchedule> {
        fx.schedules
            .list(ScheduleFilter {
                activity_id: Some(activity.id),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_tick_activates_runs_and_regenerates() {
        let fx = setup().await;
        let activity = publish_daily_drop(&fx).await;

        let report = fx.scheduler.tick(day(1) + Duration::minutes(1)).await.unwrap();
        assert_eq!(report.activated, 1);
        assert_eq!(report.executed, 1);
        assert_eq!(report.participations, 2);
        assert_eq!(report.regenerated, 1);
        assert_eq!(fx.ledger.balance("u-1").await, 5);

        let schedules = schedules_of(&fx, &activity).await;
        assert_eq!(schedules.len(), 2);
        assert_eq!(schedules[1].scheduled_time, day(2));
        assert_eq!(schedules[1].status, ScheduleStatus::Pending);
    }

    #[tokio::test]
    async fn test_tick_runs_on_a_spawned_task() {
        let fx = setup().await;
        publish_daily_drop(&fx).await;

        let scheduler = Arc::new(fx.scheduler);
        let ticking = scheduler.clone();
        let report = tokio::spawn(async move { ticking.tick(day(1) + Duration::minutes(1)).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(report.participations, 2);
        assert_eq!(fx.ledger.balance("u-2").await, 5);
    }

    #[tokio::test]
    async fn test_late_tick_keeps_time_of_day_and_stops_at_repeat_end() {
        let fx = setup().await;
        let activity = publish_daily_drop(&fx).await;

        fx.scheduler.tick(day(1) + Duration::hours(5)).await.unwrap();
        fx.scheduler.tick(day(2) + Duration::hours(7)).await.unwrap();
        fx.scheduler.tick(day(3) + Duration::minutes(3)).await.unwrap();
        let last = fx.scheduler.tick(day(5)).await.unwrap();
        assert_eq!(last.executed, 0);

        let times: Vec<_> = schedules_of(&fx, &activity).await.iter().map(|s| s.scheduled_time).collect();
        assert_eq!(times, vec![day(1), day(2), day(3)]);

        let again = fx.scheduler.tick(day(5)).await.unwrap();
        assert!(again.is_idle());
    }

    #[tokio::test]
    async fn test_schedule_of_cancelled_activity_fails_without_regeneration() {
        let fx = setup().await;
        let activity = publish_daily_drop(&fx).await;
        fx.lifecycle.cancel(activity.id, day(1) - Duration::hours(1)).await.unwrap();

        let report = fx.scheduler.tick(day(1)).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.regenerated, 0);

        let schedules = schedules_of(&fx, &activity).await;
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].status, ScheduleStatus::Failed);
    }

    #[tokio::test]
    async fn test_stale_executing_is_recovered() {
        let fx = setup().await;
        let activity = publish_daily_drop(&fx).await;
        let first = schedules_of(&fx, &activity).await.remove(0);
        assert!(fx.schedules.claim(first.id, day(1)).await.unwrap());

        let report = fx.scheduler.recover_stale_schedules(day(1) + Duration::minutes(5)).await.unwrap();
        assert_eq!(report.recovered, 0);

        let report = fx.scheduler.recover_stale_schedules(day(1) + Duration::hours(1)).await.unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.regenerated, 1);

        let schedules = schedules_of(&fx, &activity).await;
        assert_eq!(schedules[0].status, ScheduleStatus::Failed);
        assert_eq!(schedules[0].error_message.as_deref(), Some(INTERRUPTED));
        assert_eq!(schedules[1].scheduled_time, day(2));
    }

    #[tokio::test]
    async fn test_expired_activities_complete() {
        let fx = setup().await;
        let activity = publish_daily_drop(&fx).await;
        fx.scheduler.tick(day(1)).await.unwrap();

        let report = fx.scheduler.complete_expired_activities(day(21)).await.unwrap();
        assert_eq!(report.expired, 1);
        let stored = fx.activities.get(activity.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ActivityStatus::Completed);
    }
}
