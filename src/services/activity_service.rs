//! Activity service: CRUD and the lifecycle state machine.
//!
//! Every successful mutation appends an activity log entry. Admin writes go
//! through the repository's versioned update and never touch the consumed
//! budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Activity, ActivityAction, ActivityKind, ActivityLog, ActivitySchedule, ActivityStatus, RepeatPattern,
    RewardRule, ScheduleStatus, TargetRule, TriggerRule,
};
use crate::domain::ports::{ActivityFilter, ActivityLogRepository, ActivityRepository, ScheduleFilter, ScheduleRepository};
use crate::services::statistics_service::StatisticsService;

/// Partial update of an activity definition. `None` leaves a field unchanged;
/// the nested options clear nullable fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<ActivityKind>,
    pub target_rule: Option<TargetRule>,
    pub trigger_rule: Option<TriggerRule>,
    pub reward_rule: Option<RewardRule>,
    pub budget: Option<Option<i64>>,
    pub max_participants: Option<Option<u32>>,
    pub max_rewards_per_user: Option<Option<u32>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub repeat_pattern: Option<RepeatPattern>,
    pub repeat_end_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<i32>,
    /// Reject the update unless the stored version still matches.
    pub expected_version: Option<u64>,
}

impl ActivityUpdate {
    /// Apply to `activity`, returning the names of changed fields.
    fn apply(self, activity: &mut Activity) -> Vec<&'static str> {
        let Self {
            name,
            description,
            kind,
            target_rule,
            trigger_rule,
            reward_rule,
            budget,
            max_participants,
            max_rewards_per_user,
            start_time,
            end_time,
            repeat_pattern,
            repeat_end_date,
            priority,
            expected_version: _,
        } = self;

        let mut changed = Vec::new();
        macro_rules! set {
            ($field:ident) => {
                if let Some(value) = $field {
                    if activity.$field != value {
                        activity.$field = value;
                        changed.push(stringify!($field));
                    }
                }
            };
        }
        set!(name);
        set!(description);
        set!(kind);
        set!(target_rule);
        set!(trigger_rule);
        set!(reward_rule);
        set!(budget);
        set!(max_participants);
        set!(max_rewards_per_user);
        set!(start_time);
        set!(end_time);
        set!(repeat_pattern);
        set!(repeat_end_date);
        set!(priority);
        changed
    }
}

pub struct ActivityService {
    activities: Arc<dyn ActivityRepository>,
    schedules: Arc<dyn ScheduleRepository>,
    logs: Arc<dyn ActivityLogRepository>,
    statistics: Arc<StatisticsService>,
}

impl ActivityService {
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        schedules: Arc<dyn ScheduleRepository>,
        logs: Arc<dyn ActivityLogRepository>,
        statistics: Arc<StatisticsService>,
    ) -> Self {
        Self {
            activities,
            schedules,
            logs,
            statistics,
        }
    }

    /// Validate and store a new draft activity.
    pub async fn create(&self, mut activity: Activity, now: DateTime<Utc>) -> DomainResult<Activity> {
        activity.status = ActivityStatus::Draft;
        activity.consumed_budget = 0;
        activity.version = 1;
        activity.deleted_at = None;
        activity.created_at = now;
        activity.updated_at = now;
        activity.validate().map_err(DomainError::ValidationFailed)?;

        self.activities.create(&activity).await?;
        self.record(
            &activity,
            ActivityAction::Create,
            json!({
                "name": activity.name,
                "trigger": activity.trigger_kind().as_str(),
                "budget": activity.budget,
            }),
            now,
        )
        .await?;

        info!(activity_id = %activity.id, name = %activity.name, "activity created");
        Ok(activity)
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<Activity> {
        self.load(id).await
    }

    pub async fn list(&self, filter: ActivityFilter) -> DomainResult<Vec<Activity>> {
        self.activities.list(filter).await
    }

    /// Change the definition of a draft, pending or paused activity.
    pub async fn update(&self, id: Uuid, update: ActivityUpdate, now: DateTime<Utc>) -> DomainResult<Activity> {
        let mut activity = self.load(id).await?;

        if !matches!(
            activity.status,
            ActivityStatus::Draft | ActivityStatus::Pending | ActivityStatus::Paused
        ) {
            return Err(DomainError::ValidationFailed(format!(
                "activity in status {} cannot be updated",
                activity.status
            )));
        }
        if let Some(expected) = update.expected_version {
            if expected != activity.version {
                return Err(DomainError::ConcurrencyConflict {
                    entity: "activity".to_string(),
                    id: id.to_string(),
                });
            }
        }

        let old_start = activity.start_time;
        let old_repeat = activity.repeat_pattern;
        let was_scheduled = activity.needs_schedule();

        let changed = update.apply(&mut activity);
        if changed.is_empty() {
            return Ok(activity);
        }
        activity.validate().map_err(DomainError::ValidationFailed)?;
        activity.updated_at = now;

        self.activities.update(&activity).await?;
        activity.version += 1;

        let schedule_moved = activity.start_time != old_start
            || activity.repeat_pattern != old_repeat
            || activity.needs_schedule() != was_scheduled;
        if activity.status == ActivityStatus::Pending && schedule_moved {
            self.reschedule(&activity, now).await?;
        }

        self.record(&activity, ActivityAction::Update, json!({ "changed": changed }), now).await?;
        Ok(activity)
    }

    /// draft → pending. Scheduled and repeating activities get their first
    /// schedule at `start_time`.
    pub async fn publish(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<Activity> {
        let activity = self
            .transition(id, ActivityStatus::Pending, ActivityAction::Publish, now, |_| Ok(()))
            .await?;

        if activity.needs_schedule() {
            self.schedules
                .create(&ActivitySchedule::new(activity.id, activity.start_time))
                .await?;
        }
        Ok(activity)
    }

    /// pending → active, once `start_time` has arrived.
    pub async fn start(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<Activity> {
        self.transition(id, ActivityStatus::Active, ActivityAction::Start, now, |a| {
            if a.status != ActivityStatus::Pending {
                return Err(DomainError::InvalidTransition {
                    from: a.status,
                    to: ActivityStatus::Active,
                });
            }
            if now < a.start_time {
                return Err(DomainError::NotYetStartable {
                    id: a.id,
                    start_time: a.start_time.to_rfc3339(),
                });
            }
            Ok(())
        })
        .await
    }

    pub async fn pause(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<Activity> {
        self.transition(id, ActivityStatus::Paused, ActivityAction::Pause, now, |_| Ok(()))
            .await
    }

    /// paused → active, only before `end_time`.
    pub async fn resume(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<Activity> {
        self.transition(id, ActivityStatus::Active, ActivityAction::Resume, now, |a| {
            if a.status != ActivityStatus::Paused {
                return Err(DomainError::InvalidTransition {
                    from: a.status,
                    to: ActivityStatus::Active,
                });
            }
            if now >= a.end_time {
                return Err(DomainError::ActivityExpired {
                    id: a.id,
                    end_time: a.end_time.to_rfc3339(),
                });
            }
            Ok(())
        })
        .await
    }

    /// → completed, refreshing statistics right away.
    pub async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<Activity> {
        let activity = self
            .transition(id, ActivityStatus::Completed, ActivityAction::Complete, now, |_| Ok(()))
            .await?;
        self.statistics.recompute(activity.id, now).await?;
        Ok(activity)
    }

    pub async fn cancel(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<Activity> {
        self.transition(id, ActivityStatus::Cancelled, ActivityAction::Cancel, now, |_| Ok(()))
            .await
    }

    /// Soft delete. Rejected while the activity is active.
    pub async fn delete(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<()> {
        let mut activity = self.load(id).await?;
        if activity.status == ActivityStatus::Active {
            return Err(DomainError::ActivityStillActive(id));
        }

        activity.deleted_at = Some(now);
        activity.updated_at = now;
        self.activities.update(&activity).await?;
        activity.version += 1;

        self.record(&activity, ActivityAction::Delete, json!({ "status": activity.status.as_str() }), now)
            .await?;
        info!(activity_id = %id, "activity deleted");
        Ok(())
    }

    /// Apply a checked status transition and log it.
    async fn transition<F>(
        &self,
        id: Uuid,
        to: ActivityStatus,
        action: ActivityAction,
        now: DateTime<Utc>,
        precondition: F,
    ) -> DomainResult<Activity>
    where
        F: FnOnce(&Activity) -> DomainResult<()> + Send,
    {
        let mut activity = self.load(id).await?;
        precondition(&activity)?;

        let from = activity.status;
        activity.transition_to(to, now)?;
        self.activities.update(&activity).await?;
        activity.version += 1;

        self.record(&activity, action, json!({ "from": from.as_str(), "to": to.as_str() }), now)
            .await?;
        info!(activity_id = %id, from = %from, to = %to, "activity status changed");
        Ok(activity)
    }

    /// Replace pending schedules after the timing of a pending activity changed.
    async fn reschedule(&self, activity: &Activity, now: DateTime<Utc>) -> DomainResult<()> {
        let pending = self
            .schedules
            .list(ScheduleFilter {
                activity_id: Some(activity.id),
                status: Some(ScheduleStatus::Pending),
            })
            .await?;

        for schedule in pending.iter().filter(|s| s.scheduled_time != activity.start_time) {
            if self.schedules.claim(schedule.id, now).await? {
                self.schedules.mark_failed(schedule.id, now, "superseded by update").await?;
            } else {
                warn!(schedule_id = %schedule.id, "schedule claimed concurrently; leaving it");
            }
        }

        if activity.needs_schedule() {
            self.schedules
                .create(&ActivitySchedule::new(activity.id, activity.start_time))
                .await?;
        }
        Ok(())
    }

    async fn load(&self, id: Uuid) -> DomainResult<Activity> {
        match self.activities.get(id).await? {
            Some(activity) if !activity.is_deleted() => Ok(activity),
            _ => Err(DomainError::ActivityNotFound(id)),
        }
    }

    async fn record(
        &self,
        activity: &Activity,
        action: ActivityAction,
        details: serde_json::Value,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut entry = ActivityLog::new(activity.id, action, details).at(now);
        entry.user_id.clone_from(&activity.created_by);
        self.logs.append(&entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteActivityLogRepository, SqliteActivityRepository,
        SqliteParticipationRepository, SqliteScheduleRepository, SqliteStatisticsRepository,
    };
    use crate::domain::models::TriggerKind;
    use crate::domain::ports::ActivityLogFilter;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        service: ActivityService,
        schedules: Arc<SqliteScheduleRepository>,
        logs: Arc<SqliteActivityLogRepository>,
        statistics: Arc<SqliteStatisticsRepository>,
    }

    async fn setup() -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let activities = Arc::new(SqliteActivityRepository::new(pool.clone()));
        let participations = Arc::new(SqliteParticipationRepository::new(pool.clone()));
        let schedules = Arc::new(SqliteScheduleRepository::new(pool.clone()));
        let logs = Arc::new(SqliteActivityLogRepository::new(pool.clone()));
        let statistics = Arc::new(SqliteStatisticsRepository::new(pool));
        let stats_service = Arc::new(StatisticsService::new(
            activities.clone(),
            participations,
            statistics.clone(),
            3600,
        ));
        Fixture {
            service: ActivityService::new(activities, schedules.clone(), logs.clone(), stats_service),
            schedules,
            logs,
            statistics,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn draft() -> Activity {
        Activity::new("May login", TriggerRule::Login, RewardRule::fixed(10), t0(), t0() + Duration::days(10))
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_definition() {
        let fx = setup().await;
        let mut bad = draft();
        bad.end_time = bad.start_time - Duration::hours(1);
        let err = fx.service.create(bad, t0()).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_full_lifecycle_is_logged() {
        let fx = setup().await;
        let before = t0() - Duration::days(1);
        let activity = fx.service.create(draft(), before).await.unwrap();
        let id = activity.id;

        fx.service.publish(id, before).await.unwrap();
        let err = fx.service.start(id, before).await.unwrap_err();
        assert!(matches!(err, DomainError::NotYetStartable { .. }));

        fx.service.start(id, t0()).await.unwrap();
        fx.service.pause(id, t0() + Duration::hours(1)).await.unwrap();
        fx.service.resume(id, t0() + Duration::hours(2)).await.unwrap();
        let done = fx.service.complete(id, t0() + Duration::hours(3)).await.unwrap();
        assert_eq!(done.status, ActivityStatus::Completed);
        assert_eq!(done.version, 6);

        let actions: Vec<_> = fx
            .logs
            .list(ActivityLogFilter { activity_id: Some(id), ..Default::default() })
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                ActivityAction::Create,
                ActivityAction::Publish,
                ActivityAction::Start,
                ActivityAction::Pause,
                ActivityAction::Resume,
                ActivityAction::Complete,
            ]
        );

        use crate::domain::ports::StatisticsRepository;
        assert!(fx.statistics.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_terminal_states_reject_everything() {
        let fx = setup().await;
        let id = fx.service.create(draft(), t0()).await.unwrap().id;
        fx.service.cancel(id, t0()).await.unwrap();

        for result in [
            fx.service.publish(id, t0()).await,
            fx.service.start(id, t0()).await,
            fx.service.pause(id, t0()).await,
            fx.service.resume(id, t0()).await,
            fx.service.complete(id, t0()).await,
            fx.service.cancel(id, t0()).await,
        ] {
            assert!(matches!(result, Err(DomainError::InvalidTransition { from: ActivityStatus::Cancelled, .. })));
        }
        assert_eq!(fx.service.get(id).await.unwrap().status, ActivityStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_resume_after_end_is_expired() {
        let fx = setup().await;
        let id = fx.service.create(draft(), t0()).await.unwrap().id;
        fx.service.publish(id, t0()).await.unwrap();
        fx.service.start(id, t0()).await.unwrap();
        fx.service.pause(id, t0()).await.unwrap();

        let err = fx.service.resume(id, t0() + Duration::days(10)).await.unwrap_err();
        assert!(matches!(err, DomainError::ActivityExpired { .. }));
    }

    #[tokio::test]
    async fn test_start_from_paused_is_invalid() {
        let fx = setup().await;
        let id = fx.service.create(draft(), t0()).await.unwrap().id;
        fx.service.publish(id, t0()).await.unwrap();
        fx.service.start(id, t0()).await.unwrap();
        fx.service.pause(id, t0()).await.unwrap();

        let err = fx.service.start(id, t0()).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { from: ActivityStatus::Paused, to: ActivityStatus::Active }));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let fx = setup().await;
        let id = fx.service.create(draft(), t0()).await.unwrap().id;
        fx.service.publish(id, t0()).await.unwrap();
        fx.service.start(id, t0()).await.unwrap();

        let err = fx.service.delete(id, t0()).await.unwrap_err();
        assert!(matches!(err, DomainError::ActivityStillActive(_)));

        fx.service.complete(id, t0()).await.unwrap();
        fx.service.delete(id, t0()).await.unwrap();
        assert!(matches!(fx.service.get(id).await, Err(DomainError::ActivityNotFound(_))));
        assert!(fx.service.list(ActivityFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_only_in_editable_states() {
        let fx = setup().await;
        let id = fx.service.create(draft(), t0()).await.unwrap().id;

        let updated = fx
            .service
            .update(id, ActivityUpdate { name: Some("Renamed".into()), budget: Some(Some(100)), ..Default::default() }, t0())
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.budget, Some(100));
        assert_eq!(updated.version, 2);

        let stale = ActivityUpdate { priority: Some(3), expected_version: Some(1), ..Default::default() };
        assert!(matches!(
            fx.service.update(id, stale, t0()).await,
            Err(DomainError::ConcurrencyConflict { .. })
        ));

        let negative = ActivityUpdate { budget: Some(Some(-1)), ..Default::default() };
        assert!(matches!(fx.service.update(id, negative, t0()).await, Err(DomainError::ValidationFailed(_))));

        fx.service.publish(id, t0()).await.unwrap();
        fx.service.start(id, t0()).await.unwrap();
        let err = fx
            .service
            .update(id, ActivityUpdate { priority: Some(1), ..Default::default() }, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_publish_creates_first_schedule_for_scheduled_trigger() {
        let fx = setup().await;
        let mut scheduled = draft();
        scheduled.trigger_rule = TriggerRule::Scheduled;
        let id = fx.service.create(scheduled, t0()).await.unwrap().id;
        fx.service.publish(id, t0() - Duration::days(1)).await.unwrap();

        let schedules = fx
            .schedules
            .list(ScheduleFilter { activity_id: Some(id), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].scheduled_time, t0());
        assert_eq!(fx.service.get(id).await.unwrap().trigger_kind(), TriggerKind::Scheduled);
    }

    #[tokio::test]
    async fn test_moving_start_replaces_pending_schedule() {
        let fx = setup().await;
        let repeating = draft().with_repeat(RepeatPattern::Daily, None);
        let id = fx.service.create(repeating, t0()).await.unwrap().id;
        fx.service.publish(id, t0() - Duration::days(2)).await.unwrap();

        let new_start = t0() + Duration::hours(2);
        fx.service
            .update(id, ActivityUpdate { start_time: Some(new_start), ..Default::default() }, t0() - Duration::days(1))
            .await
            .unwrap();

        let pending = fx
            .schedules
            .list(ScheduleFilter { activity_id: Some(id), status: Some(ScheduleStatus::Pending) })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].scheduled_time, new_start);
    }
}
