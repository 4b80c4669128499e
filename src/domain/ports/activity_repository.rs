//! Activity repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Activity, ActivityStatus, TriggerKind};

/// Filter criteria for listing activities.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub status: Option<ActivityStatus>,
    pub trigger_kind: Option<TriggerKind>,
    /// Include soft-deleted activities.
    pub include_deleted: bool,
}

/// Repository interface for Activity persistence.
///
/// `update` is an optimistic write guarded by `version` and never touches
/// `consumed_budget`; budget only moves inside a participation unit of work.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Create a new activity.
    async fn create(&self, activity: &Activity) -> DomainResult<()>;

    /// Get an activity by ID, including soft-deleted ones.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Activity>>;

    /// Persist changes made from `activity.version`; bumps the stored version.
    ///
    /// Fails with `ConcurrencyConflict` when the stored version moved on.
    async fn update(&self, activity: &Activity) -> DomainResult<()>;

    /// List activities with optional filters, highest priority first.
    async fn list(&self, filter: ActivityFilter) -> DomainResult<Vec<Activity>>;

    /// Active, non-deleted activities of one trigger kind whose window
    /// contains `now`, ordered by priority descending.
    async fn list_active_by_trigger(
        &self,
        kind: TriggerKind,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Activity>>;

    /// Pending activities whose start time has arrived.
    async fn list_due_to_start(&self, now: DateTime<Utc>) -> DomainResult<Vec<Activity>>;

    /// Active or paused activities whose end time has passed.
    async fn list_expired(&self, now: DateTime<Utc>) -> DomainResult<Vec<Activity>>;
}
