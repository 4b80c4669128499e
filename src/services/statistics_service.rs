//! Statistics aggregator.
//!
//! Rollups are cached per activity and recomputed on read once they are
//! older than the staleness window, or eagerly when an activity completes.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ActivityStatistics;
use crate::domain::ports::{ActivityFilter, ActivityRepository, ParticipationRepository, StatisticsRepository};

pub struct StatisticsService {
    activities: Arc<dyn ActivityRepository>,
    participations: Arc<dyn ParticipationRepository>,
    statistics: Arc<dyn StatisticsRepository>,
    staleness: Duration,
}

impl StatisticsService {
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        participations: Arc<dyn ParticipationRepository>,
        statistics: Arc<dyn StatisticsRepository>,
        staleness_secs: u64,
    ) -> Self {
        Self {
            activities,
            participations,
            statistics,
            staleness: Duration::seconds(staleness_secs.min(u64::from(u32::MAX)) as i64),
        }
    }

    /// Recompute and cache the rollup for one activity.
    pub async fn recompute(&self, activity_id: Uuid, now: DateTime<Utc>) -> DomainResult<ActivityStatistics> {
        let aggregate = self.participations.aggregate(activity_id).await?;
        let stats = ActivityStatistics::from_aggregate(activity_id, &aggregate, now);
        self.statistics.upsert(&stats).await?;
        debug!(
            activity_id = %activity_id,
            total = stats.total_participants,
            completed = stats.completed_participants,
            "statistics recomputed"
        );
        Ok(stats)
    }

    /// Cached statistics, recomputed when missing or stale.
    pub async fn get(&self, activity_id: Uuid, now: DateTime<Utc>) -> DomainResult<ActivityStatistics> {
        match self.activities.get(activity_id).await? {
            Some(activity) if !activity.is_deleted() => {}
            _ => return Err(DomainError::ActivityNotFound(activity_id)),
        }
        self.cached_or_fresh(activity_id, now).await
    }

    /// Statistics for every non-deleted activity, most popular first.
    pub async fn get_all(&self, now: DateTime<Utc>) -> DomainResult<Vec<ActivityStatistics>> {
        let activities = self.activities.list(ActivityFilter::default()).await?;

        let mut all = Vec::with_capacity(activities.len());
        for activity in activities {
            all.push(self.cached_or_fresh(activity.id, now).await?);
        }

        all.sort_by(|a, b| b.popularity_score.total_cmp(&a.popularity_score));
        Ok(all)
    }

    /// Recompute every non-deleted activity regardless of staleness.
    pub async fn refresh_all(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let activities = self.activities.list(ActivityFilter::default()).await?;
        for activity in &activities {
            self.recompute(activity.id, now).await?;
        }
        Ok(activities.len())
    }

    async fn cached_or_fresh(&self, activity_id: Uuid, now: DateTime<Utc>) -> DomainResult<ActivityStatistics> {
        match self.statistics.get(activity_id).await? {
            Some(cached) if !cached.is_stale(now, self.staleness) => Ok(cached),
            _ => self.recompute(activity_id, now).await,
        }
    }
}
