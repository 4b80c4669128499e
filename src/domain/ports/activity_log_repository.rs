//! Repository port for the append-only activity log.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ActivityAction, ActivityLog};

/// Filter for querying log entries.
#[derive(Debug, Default, Clone)]
pub struct ActivityLogFilter {
    pub activity_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub action: Option<ActivityAction>,
    pub limit: Option<u32>,
}

/// Log entries are only ever appended; there is no update or delete.
#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn append(&self, entry: &ActivityLog) -> DomainResult<()>;

    /// Entries matching the filter, oldest first.
    async fn list(&self, filter: ActivityLogFilter) -> DomainResult<Vec<ActivityLog>>;
}
