//! Participation repository port.
//!
//! Reads go straight through the repository. Writes happen inside a
//! [`ParticipationUnit`], a transaction scoped to one (activity, user) pair
//! that also owns the activity's budget counter for its duration.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Activity, ActivityLog, Participation, ParticipationAggregate};

#[async_trait]
pub trait ParticipationRepository: Send + Sync {
    /// Get the participation of a user in an activity.
    async fn get(&self, activity_id: Uuid, user_id: &str) -> DomainResult<Option<Participation>>;

    /// All participations of an activity, oldest first.
    async fn list_for_activity(&self, activity_id: Uuid) -> DomainResult<Vec<Participation>>;

    /// Aggregate figures for statistics.
    async fn aggregate(&self, activity_id: Uuid) -> DomainResult<ParticipationAggregate>;

    /// Open a unit of work for one (activity, user) pair.
    ///
    /// The unit holds the activity row lock until it is committed or dropped;
    /// dropping without commit rolls everything back.
    async fn begin(&self, activity_id: Uuid, user_id: &str) -> DomainResult<Box<dyn ParticipationUnit>>;
}

/// A transaction over one (activity, user) pair.
#[async_trait]
pub trait ParticipationUnit: Send {
    /// The locked activity row, as of this transaction.
    async fn activity(&mut self) -> DomainResult<Option<Activity>>;

    /// The existing participation, if any.
    async fn participation(&mut self) -> DomainResult<Option<Participation>>;

    /// Number of distinct users participating in the activity.
    async fn participant_count(&mut self) -> DomainResult<u64>;

    /// Insert or update the participation row.
    async fn save_participation(&mut self, participation: &Participation) -> DomainResult<()>;

    /// Atomically add `amount` to `consumed_budget` unless that would exceed
    /// the budget. Returns whether the credits were reserved.
    async fn try_consume_budget(&mut self, amount: i64) -> DomainResult<bool>;

    /// Append an audit entry inside the same transaction.
    async fn append_log(&mut self, entry: &ActivityLog) -> DomainResult<()>;

    async fn commit(self: Box<Self>) -> DomainResult<()>;
}
