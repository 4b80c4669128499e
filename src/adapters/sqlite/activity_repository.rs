//! SQLite implementation of the ActivityRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::adapters::sqlite::{
    format_datetime, format_optional_datetime, parse_datetime, parse_optional_datetime, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Activity, ActivityKind, ActivityStatus, RepeatPattern, TriggerKind};
use crate::domain::ports::{ActivityFilter, ActivityRepository};

const SELECT_ACTIVITY: &str = "SELECT id, name, description, kind, target_rule, trigger_rule, reward_rule, \
     budget, consumed_budget, max_participants, max_rewards_per_user, status, start_time, end_time, \
     repeat_pattern, repeat_end_date, priority, created_by, created_at, updated_at, deleted_at, version \
     FROM activities";

#[derive(Clone)]
pub struct SqliteActivityRepository {
    pool: SqlitePool,
}

impl SqliteActivityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: &str, bindings: &[String]) -> DomainResult<Vec<Activity>> {
        let query = format!("{SELECT_ACTIVITY} WHERE {clause} ORDER BY priority DESC, start_time ASC");
        let mut q = sqlx::query_as::<_, ActivityRow>(&query);
        for binding in bindings {
            q = q.bind(binding);
        }
        let rows: Vec<ActivityRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Activity::try_from).collect()
    }

    /// Read one activity on an already-acquired connection, such as an open
    /// participation transaction.
    pub(crate) async fn fetch_in(conn: &mut SqliteConnection, id: &str) -> DomainResult<Option<Activity>> {
        let query = format!("{SELECT_ACTIVITY} WHERE id = ?");
        let row: Option<ActivityRow> = sqlx::query_as(&query).bind(id).fetch_optional(conn).await?;
        row.map(Activity::try_from).transpose()
    }
}

#[async_trait]
impl ActivityRepository for SqliteActivityRepository {
    async fn create(&self, activity: &Activity) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO activities (id, name, description, kind, target_rule, trigger_type, trigger_rule,
               reward_rule, budget, consumed_budget, max_participants, max_rewards_per_user, status,
               start_time, end_time, repeat_pattern, repeat_end_date, priority, created_by,
               created_at, updated_at, deleted_at, version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(activity.id.to_string())
        .bind(&activity.name)
        .bind(&activity.description)
        .bind(activity.kind.as_str())
        .bind(serde_json::to_string(&activity.target_rule)?)
        .bind(activity.trigger_kind().as_str())
        .bind(serde_json::to_string(&activity.trigger_rule)?)
        .bind(serde_json::to_string(&activity.reward_rule)?)
        .bind(activity.budget)
        .bind(activity.consumed_budget)
        .bind(activity.max_participants.map(i64::from))
        .bind(activity.max_rewards_per_user.map(i64::from))
        .bind(activity.status.as_str())
        .bind(format_datetime(activity.start_time))
        .bind(format_datetime(activity.end_time))
        .bind(serde_json::to_string(&activity.repeat_pattern)?)
        .bind(format_optional_datetime(activity.repeat_end_date))
        .bind(activity.priority)
        .bind(&activity.created_by)
        .bind(format_datetime(activity.created_at))
        .bind(format_datetime(activity.updated_at))
        .bind(format_optional_datetime(activity.deleted_at))
        .bind(activity.version as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Activity>> {
        let query = format!("{SELECT_ACTIVITY} WHERE id = ?");
        let row: Option<ActivityRow> = sqlx::query_as(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Activity::try_from).transpose()
    }

    async fn update(&self, activity: &Activity) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE activities SET name = ?, description = ?, kind = ?, target_rule = ?, trigger_type = ?,
               trigger_rule = ?, reward_rule = ?, budget = ?, max_participants = ?, max_rewards_per_user = ?,
               status = ?, start_time = ?, end_time = ?, repeat_pattern = ?, repeat_end_date = ?,
               priority = ?, updated_at = ?, deleted_at = ?, version = version + 1
               WHERE id = ? AND version = ?"#,
        )
        .bind(&activity.name)
        .bind(&activity.description)
        .bind(activity.kind.as_str())
        .bind(serde_json::to_string(&activity.target_rule)?)
        .bind(activity.trigger_kind().as_str())
        .bind(serde_json::to_string(&activity.trigger_rule)?)
        .bind(serde_json::to_string(&activity.reward_rule)?)
        .bind(activity.budget)
        .bind(activity.max_participants.map(i64::from))
        .bind(activity.max_rewards_per_user.map(i64::from))
        .bind(activity.status.as_str())
        .bind(format_datetime(activity.start_time))
        .bind(format_datetime(activity.end_time))
        .bind(serde_json::to_string(&activity.repeat_pattern)?)
        .bind(format_optional_datetime(activity.repeat_end_date))
        .bind(activity.priority)
        .bind(format_datetime(activity.updated_at))
        .bind(format_optional_datetime(activity.deleted_at))
        .bind(activity.id.to_string())
        .bind(activity.version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM activities WHERE id = ?")
                .bind(activity.id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            return Err(match exists {
                None => DomainError::ActivityNotFound(activity.id),
                Some(_) => DomainError::ConcurrencyConflict {
                    entity: "activity".to_string(),
                    id: activity.id.to_string(),
                },
            });
        }

        Ok(())
    }

    async fn list(&self, filter: ActivityFilter) -> DomainResult<Vec<Activity>> {
        let mut clause = String::from("1=1");
        let mut bindings: Vec<String> = Vec::new();

        if !filter.include_deleted {
            clause.push_str(" AND deleted_at IS NULL");
        }
        if let Some(status) = &filter.status {
            clause.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(kind) = &filter.trigger_kind {
            clause.push_str(" AND trigger_type = ?");
            bindings.push(kind.as_str().to_string());
        }

        self.fetch_where(&clause, &bindings).await
    }

    async fn list_active_by_trigger(&self, kind: TriggerKind, now: DateTime<Utc>) -> DomainResult<Vec<Activity>> {
        let now = format_datetime(now);
        self.fetch_where(
            "status = 'active' AND deleted_at IS NULL AND trigger_type = ? AND start_time <= ? AND end_time >= ?",
            &[kind.as_str().to_string(), now.clone(), now],
        )
        .await
    }

    async fn list_due_to_start(&self, now: DateTime<Utc>) -> DomainResult<Vec<Activity>> {
        self.fetch_where(
            "status = 'pending' AND deleted_at IS NULL AND start_time <= ?",
            &[format_datetime(now)],
        )
        .await
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> DomainResult<Vec<Activity>> {
        self.fetch_where(
            "status IN ('active', 'paused') AND deleted_at IS NULL AND end_time < ?",
            &[format_datetime(now)],
        )
        .await
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: String,
    name: String,
    description: String,
    kind: String,
    target_rule: String,
    trigger_rule: String,
    reward_rule: String,
    budget: Option<i64>,
    consumed_budget: i64,
    max_participants: Option<i64>,
    max_rewards_per_user: Option<i64>,
    status: String,
    start_time: String,
    end_time: String,
    repeat_pattern: Option<String>,
    repeat_end_date: Option<String>,
    priority: i64,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
    version: i64,
}

impl TryFrom<ActivityRow> for Activity {
    type Error = DomainError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let status = ActivityStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;
        let repeat_pattern: RepeatPattern = super::parse_json_or_default(row.repeat_pattern)?;

        Ok(Activity {
            id: parse_uuid(&row.id)?,
            name: row.name,
            description: row.description,
            kind: ActivityKind::from_str(&row.kind).unwrap_or_default(),
            target_rule: serde_json::from_str(&row.target_rule)?,
            trigger_rule: serde_json::from_str(&row.trigger_rule)?,
            reward_rule: serde_json::from_str(&row.reward_rule)?,
            budget: row.budget,
            consumed_budget: row.consumed_budget,
            max_participants: row.max_participants.map(|v| v as u32),
            max_rewards_per_user: row.max_rewards_per_user.map(|v| v as u32),
            status,
            start_time: parse_datetime(&row.start_time)?,
            end_time: parse_datetime(&row.end_time)?,
            repeat_pattern,
            repeat_end_date: parse_optional_datetime(row.repeat_end_date)?,
            priority: row.priority as i32,
            created_by: row.created_by,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            deleted_at: parse_optional_datetime(row.deleted_at)?,
            version: row.version as u64,
        })
    }
}
