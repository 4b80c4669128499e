//! SQLite adapter for the append-only activity log.

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool};

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActivityAction, ActivityLog};
use crate::domain::ports::{ActivityLogFilter, ActivityLogRepository};

#[derive(Clone)]
pub struct SqliteActivityLogRepository {
    pool: SqlitePool,
}

impl SqliteActivityLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Insert a log entry on any executor, so units of work can log inside
/// their own transaction.
pub(crate) async fn insert_log<'e, E>(executor: E, entry: &ActivityLog) -> DomainResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO activity_logs (id, activity_id, user_id, action, details, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id.to_string())
    .bind(entry.activity_id.to_string())
    .bind(&entry.user_id)
    .bind(entry.action.as_str())
    .bind(serde_json::to_string(&entry.details)?)
    .bind(format_datetime(entry.created_at))
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl ActivityLogRepository for SqliteActivityLogRepository {
    async fn append(&self, entry: &ActivityLog) -> DomainResult<()> {
        insert_log(&self.pool, entry).await
    }

    async fn list(&self, filter: ActivityLogFilter) -> DomainResult<Vec<ActivityLog>> {
        let mut query = String::from("SELECT * FROM activity_logs WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(activity_id) = filter.activity_id {
            query.push_str(" AND activity_id = ?");
            bindings.push(activity_id.to_string());
        }
        if let Some(user_id) = &filter.user_id {
            query.push_str(" AND user_id = ?");
            bindings.push(user_id.clone());
        }
        if let Some(action) = filter.action {
            query.push_str(" AND action = ?");
            bindings.push(action.as_str().to_string());
        }

        query.push_str(" ORDER BY created_at ASC, rowid ASC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, LogRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<LogRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(ActivityLog::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: String,
    activity_id: String,
    user_id: Option<String>,
    action: String,
    details: String,
    created_at: String,
}

impl TryFrom<LogRow> for ActivityLog {
    type Error = DomainError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let action = ActivityAction::from_str(&row.action)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid log action: {}", row.action)))?;

        Ok(ActivityLog {
            id: parse_uuid(&row.id)?,
            activity_id: parse_uuid(&row.activity_id)?,
            user_id: row.user_id,
            action,
            details: serde_json::from_str(&row.details)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_append_and_filter() {
        let repo = SqliteActivityLogRepository::new(create_migrated_test_pool().await.unwrap());
        let activity_id = Uuid::new_v4();
        let now = Utc::now();

        repo.append(&ActivityLog::new(activity_id, ActivityAction::Create, json!({})).at(now)).await.unwrap();
        repo.append(
            &ActivityLog::new(activity_id, ActivityAction::Participate, json!({"progress": 1}))
                .for_user("u-1")
                .at(now + Duration::seconds(1)),
        )
        .await
        .unwrap();
        repo.append(&ActivityLog::new(Uuid::new_v4(), ActivityAction::Create, json!({}))).await.unwrap();

        let for_activity = repo
            .list(ActivityLogFilter { activity_id: Some(activity_id), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(for_activity.len(), 2);
        assert_eq!(for_activity[0].action, ActivityAction::Create);

        let participations = repo
            .list(ActivityLogFilter { action: Some(ActivityAction::Participate), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(participations.len(), 1);
        assert_eq!(participations[0].user_id.as_deref(), Some("u-1"));
        assert_eq!(participations[0].details["progress"], 1);
    }
}
