//! Repository port for cached activity statistics.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::ActivityStatistics;

#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    async fn get(&self, activity_id: Uuid) -> DomainResult<Option<ActivityStatistics>>;

    /// Insert or replace the cached rollup.
    async fn upsert(&self, stats: &ActivityStatistics) -> DomainResult<()>;
}
