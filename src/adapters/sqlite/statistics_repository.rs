//! SQLite adapter for cached activity statistics.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_uuid};
use crate::domain::errors::DomainResult;
use crate::domain::models::ActivityStatistics;
use crate::domain::ports::StatisticsRepository;

#[derive(Clone)]
pub struct SqliteStatisticsRepository {
    pool: SqlitePool,
}

impl SqliteStatisticsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatisticsRepository for SqliteStatisticsRepository {
    async fn get(&self, activity_id: Uuid) -> DomainResult<Option<ActivityStatistics>> {
        let row: Option<StatisticsRow> = sqlx::query_as("SELECT * FROM activity_statistics WHERE activity_id = ?")
            .bind(activity_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(StatisticsRow::into_statistics).transpose()
    }

    async fn upsert(&self, stats: &ActivityStatistics) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO activity_statistics (activity_id, total_participants, completed_participants,
               total_credits_awarded, average_completion, completion_rate, popularity_score, last_calculated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(activity_id) DO UPDATE SET
                 total_participants = excluded.total_participants,
                 completed_participants = excluded.completed_participants,
                 total_credits_awarded = excluded.total_credits_awarded,
                 average_completion = excluded.average_completion,
                 completion_rate = excluded.completion_rate,
                 popularity_score = excluded.popularity_score,
                 last_calculated_at = excluded.last_calculated_at"#,
        )
        .bind(stats.activity_id.to_string())
        .bind(stats.total_participants as i64)
        .bind(stats.completed_participants as i64)
        .bind(stats.total_credits_awarded)
        .bind(stats.average_completion)
        .bind(stats.completion_rate)
        .bind(stats.popularity_score)
        .bind(format_datetime(stats.last_calculated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct StatisticsRow {
    activity_id: String,
    total_participants: i64,
    completed_participants: i64,
    total_credits_awarded: i64,
    average_completion: f64,
    completion_rate: f64,
    popularity_score: f64,
    last_calculated_at: String,
}

impl StatisticsRow {
    fn into_statistics(self) -> DomainResult<ActivityStatistics> {
        Ok(ActivityStatistics {
            activity_id: parse_uuid(&self.activity_id)?,
            total_participants: self.total_participants as u64,
            completed_participants: self.completed_participants as u64,
            total_credits_awarded: self.total_credits_awarded,
            average_completion: self.average_completion,
            completion_rate: self.completion_rate,
            popularity_score: self.popularity_score,
            last_calculated_at: parse_datetime(&self.last_calculated_at)?,
        })
    }
}
