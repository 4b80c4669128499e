//! SQLite adapter for ScheduleRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActivitySchedule, ScheduleStatus};
use crate::domain::ports::{ScheduleFilter, ScheduleRepository};

#[derive(Clone)]
pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: String,
    activity_id: String,
    scheduled_time: String,
    status: String,
    started_at: Option<String>,
    executed_time: Option<String>,
    error_message: Option<String>,
    created_at: String,
}

fn row_to_schedule(row: ScheduleRow) -> DomainResult<ActivitySchedule> {
    Ok(ActivitySchedule {
        id: parse_uuid(&row.id)?,
        activity_id: parse_uuid(&row.activity_id)?,
        scheduled_time: parse_datetime(&row.scheduled_time)?,
        status: ScheduleStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid schedule status: {}", row.status)))?,
        started_at: parse_optional_datetime(row.started_at)?,
        executed_time: parse_optional_datetime(row.executed_time)?,
        error_message: row.error_message,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    async fn create(&self, schedule: &ActivitySchedule) -> DomainResult<bool> {
        let result = sqlx::query(
            "INSERT INTO activity_schedules
             (id, activity_id, scheduled_time, status, started_at, executed_time, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(activity_id, scheduled_time) DO NOTHING"
        )
        .bind(schedule.id.to_string())
        .bind(schedule.activity_id.to_string())
        .bind(format_datetime(schedule.scheduled_time))
        .bind(schedule.status.as_str())
        .bind(schedule.started_at.map(format_datetime))
        .bind(schedule.executed_time.map(format_datetime))
        .bind(&schedule.error_message)
        .bind(format_datetime(schedule.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ActivitySchedule>> {
        let row: Option<ScheduleRow> = sqlx::query_as("SELECT * FROM activity_schedules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_schedule).transpose()
    }

    async fn list(&self, filter: ScheduleFilter) -> DomainResult<Vec<ActivitySchedule>> {
        let mut query = String::from("SELECT * FROM activity_schedules WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(activity_id) = filter.activity_id {
            query.push_str(" AND activity_id = ?");
            bindings.push(activity_id.to_string());
        }
        if let Some(status) = filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        query.push_str(" ORDER BY scheduled_time ASC");

        let mut q = sqlx::query_as::<_, ScheduleRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_schedule).collect()
    }

    async fn list_due(&self, now: DateTime<Utc>) -> DomainResult<Vec<ActivitySchedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            "SELECT * FROM activity_schedules WHERE status = 'pending' AND scheduled_time <= ? ORDER BY scheduled_time ASC"
        )
        .bind(format_datetime(now))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_schedule).collect()
    }

    async fn list_stale_executing(&self, started_before: DateTime<Utc>) -> DomainResult<Vec<ActivitySchedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            "SELECT * FROM activity_schedules
             WHERE status = 'executing' AND (started_at IS NULL OR started_at < ?)
             ORDER BY scheduled_time ASC"
        )
        .bind(format_datetime(started_before))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_schedule).collect()
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<bool> {
        let result = sqlx::query(
            "UPDATE activity_schedules SET status = 'executing', started_at = ? WHERE id = ? AND status = 'pending'"
        )
        .bind(format_datetime(now))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_completed(&self, id: Uuid, executed_time: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE activity_schedules SET status = 'completed', executed_time = ?, error_message = NULL WHERE id = ?"
        )
        .bind(format_datetime(executed_time))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ScheduleNotFound(id));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, executed_time: DateTime<Utc>, error: &str) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE activity_schedules SET status = 'failed', executed_time = ?, error_message = ? WHERE id = ?"
        )
        .bind(format_datetime(executed_time))
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ScheduleNotFound(id));
        }
        Ok(())
    }
}
