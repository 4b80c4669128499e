//! SQLite implementation of the ParticipationRepository.
//!
//! A [`SqliteParticipationUnit`] opens its transaction by touching the
//! activity row. That first write takes SQLite's write lock, so every later
//! read in the unit sees a stable activity and budget, and concurrent units
//! queue on the busy timeout instead of failing on a stale snapshot.

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use super::activity_log_repository::insert_log;
use super::activity_repository::SqliteActivityRepository;
use crate::adapters::sqlite::{
    format_datetime, format_optional_datetime, parse_datetime, parse_optional_datetime, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Activity, ActivityLog, EventPayload, Participation, ParticipationAggregate};
use crate::domain::ports::{ParticipationRepository, ParticipationUnit};

const SELECT_PARTICIPATION: &str = "SELECT id, activity_id, user_id, participated_at, progress, \
     progress_details, reward_credits, rewards_granted, completed_at, updated_at FROM participations";

#[derive(Clone)]
pub struct SqliteParticipationRepository {
    pool: SqlitePool,
}

impl SqliteParticipationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParticipationRepository for SqliteParticipationRepository {
    async fn get(&self, activity_id: Uuid, user_id: &str) -> DomainResult<Option<Participation>> {
        let query = format!("{SELECT_PARTICIPATION} WHERE activity_id = ? AND user_id = ?");
        let row: Option<ParticipationRow> = sqlx::query_as(&query)
            .bind(activity_id.to_string())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Participation::try_from).transpose()
    }

    async fn list_for_activity(&self, activity_id: Uuid) -> DomainResult<Vec<Participation>> {
        let query = format!("{SELECT_PARTICIPATION} WHERE activity_id = ? ORDER BY participated_at, user_id");
        let rows: Vec<ParticipationRow> = sqlx::query_as(&query)
            .bind(activity_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Participation::try_from).collect()
    }

    async fn aggregate(&self, activity_id: Uuid) -> DomainResult<ParticipationAggregate> {
        let (total, completed, credits, average): (i64, i64, i64, f64) = sqlx::query_as(
            r#"SELECT COUNT(*), COUNT(completed_at), COALESCE(SUM(reward_credits), 0), COALESCE(AVG(progress), 0.0)
               FROM participations WHERE activity_id = ?"#,
        )
        .bind(activity_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(ParticipationAggregate {
            total_participants: total as u64,
            completed_participants: completed as u64,
            total_credits_awarded: credits,
            average_progress: average,
        })
    }

    async fn begin(&self, activity_id: Uuid, user_id: &str) -> DomainResult<Box<dyn ParticipationUnit>> {
        let mut tx = self.pool.begin().await?;
        let activity_key = activity_id.to_string();

        sqlx::query("UPDATE activities SET updated_at = updated_at WHERE id = ?")
            .bind(&activity_key)
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(SqliteParticipationUnit {
            tx,
            activity_id: activity_key,
            user_id: user_id.to_string(),
        }))
    }
}

/// Unit of work over one (activity, user) pair. Rolls back on drop.
pub struct SqliteParticipationUnit {
    tx: Transaction<'static, Sqlite>,
    activity_id: String,
    user_id: String,
}

#[async_trait]
impl ParticipationUnit for SqliteParticipationUnit {
    async fn activity(&mut self) -> DomainResult<Option<Activity>> {
        SqliteActivityRepository::fetch_in(&mut *self.tx, &self.activity_id).await
    }

    async fn participation(&mut self) -> DomainResult<Option<Participation>> {
        let query = format!("{SELECT_PARTICIPATION} WHERE activity_id = ? AND user_id = ?");
        let row: Option<ParticipationRow> = sqlx::query_as(&query)
            .bind(&self.activity_id)
            .bind(&self.user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Participation::try_from).transpose()
    }

    async fn participant_count(&mut self) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM participations WHERE activity_id = ?")
            .bind(&self.activity_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count as u64)
    }

    async fn save_participation(&mut self, participation: &Participation) -> DomainResult<()> {
        if participation.activity_id.to_string() != self.activity_id || participation.user_id != self.user_id {
            return Err(DomainError::Internal(format!(
                "participation {} does not belong to this unit of work",
                participation.id
            )));
        }

        sqlx::query(
            r#"INSERT INTO participations (id, activity_id, user_id, participated_at, progress,
               progress_details, reward_credits, rewards_granted, completed_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(activity_id, user_id) DO UPDATE SET
                 progress = excluded.progress,
                 progress_details = excluded.progress_details,
                 reward_credits = excluded.reward_credits,
                 rewards_granted = excluded.rewards_granted,
                 completed_at = excluded.completed_at,
                 updated_at = excluded.updated_at"#,
        )
        .bind(participation.id.to_string())
        .bind(&self.activity_id)
        .bind(&self.user_id)
        .bind(format_datetime(participation.participated_at))
        .bind(i64::from(participation.progress))
        .bind(serde_json::to_string(&participation.progress_details)?)
        .bind(participation.reward_credits)
        .bind(i64::from(participation.rewards_granted))
        .bind(format_optional_datetime(participation.completed_at))
        .bind(format_datetime(participation.updated_at))
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn try_consume_budget(&mut self, amount: i64) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"UPDATE activities SET consumed_budget = consumed_budget + ?
               WHERE id = ? AND (budget IS NULL OR consumed_budget + ? <= budget)"#,
        )
        .bind(amount)
        .bind(&self.activity_id)
        .bind(amount)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_log(&mut self, entry: &ActivityLog) -> DomainResult<()> {
        insert_log(&mut *self.tx, entry).await
    }

    async fn commit(self: Box<Self>) -> DomainResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ParticipationRow {
    id: String,
    activity_id: String,
    user_id: String,
    participated_at: String,
    progress: i64,
    progress_details: String,
    reward_credits: i64,
    rewards_granted: i64,
    completed_at: Option<String>,
    updated_at: String,
}

impl TryFrom<ParticipationRow> for Participation {
    type Error = DomainError;

    fn try_from(row: ParticipationRow) -> Result<Self, Self::Error> {
        let progress_details: EventPayload = serde_json::from_str(&row.progress_details)?;

        Ok(Participation {
            id: parse_uuid(&row.id)?,
            activity_id: parse_uuid(&row.activity_id)?,
            user_id: row.user_id,
            participated_at: parse_datetime(&row.participated_at)?,
            progress: u32::try_from(row.progress).unwrap_or(u32::MAX),
            progress_details,
            reward_credits: row.reward_credits,
            rewards_granted: u32::try_from(row.rewards_granted).unwrap_or(u32::MAX),
            completed_at: parse_optional_datetime(row.completed_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{ActivityAction, RewardRule, TriggerRule};
    use crate::domain::ports::ActivityRepository;
    use chrono::{Duration, Utc};
    use serde_json::json;

    async fn setup() -> (SqliteParticipationRepository, SqliteActivityRepository, Activity) {
        let pool = create_migrated_test_pool().await.unwrap();
        let activities = SqliteActivityRepository::new(pool.clone());
        let now = Utc::now();
        let activity = Activity::new("Budgeted", TriggerRule::Login, RewardRule::fixed(10), now, now + Duration::days(1))
            .with_budget(25);
        activities.create(&activity).await.unwrap();
        (SqliteParticipationRepository::new(pool), activities, activity)
    }

    #[tokio::test]
    async fn test_unit_saves_participation_and_log_on_commit() {
        let (repo, _, activity) = setup().await;
        let now = Utc::now();

        let mut unit = repo.begin(activity.id, "u-1").await.unwrap();
        assert!(unit.participation().await.unwrap().is_none());
        assert_eq!(unit.activity().await.unwrap().unwrap().id, activity.id);

        let mut p = Participation::new(activity.id, "u-1", now);
        p.record_event(json!({"device": "ios"}).as_object().unwrap(), now);
        unit.save_participation(&p).await.unwrap();
        unit.append_log(&ActivityLog::new(activity.id, ActivityAction::Participate, json!({"progress": 1})).for_user("u-1"))
            .await
            .unwrap();
        unit.commit().await.unwrap();

        let stored = repo.get(activity.id, "u-1").await.unwrap().unwrap();
        assert_eq!(stored.progress, 1);
        assert_eq!(stored.progress_details["device"], "ios");
    }

    #[tokio::test]
    async fn test_dropped_unit_rolls_back() {
        let (repo, activities, activity) = setup().await;
        {
            let mut unit = repo.begin(activity.id, "u-1").await.unwrap();
            unit.save_participation(&Participation::new(activity.id, "u-1", Utc::now())).await.unwrap();
            assert!(unit.try_consume_budget(10).await.unwrap());
        }

        assert!(repo.get(activity.id, "u-1").await.unwrap().is_none());
        assert_eq!(activities.get(activity.id).await.unwrap().unwrap().consumed_budget, 0);
    }

    #[tokio::test]
    async fn test_budget_guard_refuses_overspend() {
        let (repo, activities, activity) = setup().await;

        let mut unit = repo.begin(activity.id, "u-1").await.unwrap();
        assert!(unit.try_consume_budget(10).await.unwrap());
        assert!(unit.try_consume_budget(10).await.unwrap());
        assert!(!unit.try_consume_budget(10).await.unwrap());
        unit.commit().await.unwrap();

        assert_eq!(activities.get(activity.id).await.unwrap().unwrap().consumed_budget, 20);
    }

    #[tokio::test]
    async fn test_save_is_an_upsert_per_user() {
        let (repo, _, activity) = setup().await;
        let now = Utc::now();
        let mut p = Participation::new(activity.id, "u-1", now);

        for _ in 0..3 {
            let mut unit = repo.begin(activity.id, "u-1").await.unwrap();
            p.record_event(&EventPayload::new(), now);
            unit.save_participation(&p).await.unwrap();
            unit.commit().await.unwrap();
        }

        let all = repo.list_for_activity(activity.id).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].progress, 3);
    }

    #[tokio::test]
    async fn test_aggregate_counts_completions_and_credits() {
        let (repo, _, activity) = setup().await;
        let now = Utc::now();

        for (user, credits, complete) in [("a", 10, true), ("b", 0, false), ("c", 5, true)] {
            let mut unit = repo.begin(activity.id, user).await.unwrap();
            let mut p = Participation::new(activity.id, user, now);
            p.record_event(&EventPayload::new(), now);
            p.grant(credits, complete, now);
            unit.save_participation(&p).await.unwrap();
            unit.commit().await.unwrap();
        }

        let agg = repo.aggregate(activity.id).await.unwrap();
        assert_eq!(agg.total_participants, 3);
        assert_eq!(agg.completed_participants, 2);
        assert_eq!(agg.total_credits_awarded, 15);
        assert!((agg.average_progress - 1.0).abs() < f64::EPSILON);

        let empty = repo.aggregate(Uuid::new_v4()).await.unwrap();
        assert_eq!(empty, ParticipationAggregate::default());
    }
}
