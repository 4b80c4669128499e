//! Repository port for activity schedule persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ActivitySchedule, ScheduleStatus};

/// Filter for listing schedules.
#[derive(Debug, Default)]
pub struct ScheduleFilter {
    pub activity_id: Option<Uuid>,
    pub status: Option<ScheduleStatus>,
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Insert a new occurrence. Returns false when the activity already has
    /// one at that `scheduled_time`.
    async fn create(&self, schedule: &ActivitySchedule) -> DomainResult<bool>;

    /// Get a schedule by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<ActivitySchedule>>;

    /// List schedules, earliest scheduled time first.
    async fn list(&self, filter: ScheduleFilter) -> DomainResult<Vec<ActivitySchedule>>;

    /// Pending schedules with `scheduled_time <= now`.
    async fn list_due(&self, now: DateTime<Utc>) -> DomainResult<Vec<ActivitySchedule>>;

    /// Executing schedules that started before `started_before`.
    async fn list_stale_executing(&self, started_before: DateTime<Utc>) -> DomainResult<Vec<ActivitySchedule>>;

    /// Move a schedule from pending to executing. Returns false when another
    /// worker got there first.
    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<bool>;

    /// Mark an executing schedule completed.
    async fn mark_completed(&self, id: Uuid, executed_time: DateTime<Utc>) -> DomainResult<()>;

    /// Mark a schedule failed with an error message.
    async fn mark_failed(&self, id: Uuid, executed_time: DateTime<Utc>, error: &str) -> DomainResult<()>;
}
