//! Cached per-activity rollups.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::participation::ParticipationAggregate;

const POPULARITY_PARTICIPANT_WEIGHT: f64 = 0.7;
const POPULARITY_COMPLETION_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStatistics {
    pub activity_id: Uuid,
    pub total_participants: u64,
    pub completed_participants: u64,
    pub total_credits_awarded: i64,
    /// Mean participation progress.
    pub average_completion: f64,
    /// `completed / total`, 0 when nobody participated.
    pub completion_rate: f64,
    pub popularity_score: f64,
    pub last_calculated_at: DateTime<Utc>,
}

impl ActivityStatistics {
    pub fn from_aggregate(activity_id: Uuid, agg: &ParticipationAggregate, now: DateTime<Utc>) -> Self {
        let total = agg.total_participants as f64;
        let completed = agg.completed_participants as f64;
        let completion_rate = if agg.total_participants == 0 {
            0.0
        } else {
            completed / total
        };

        Self {
            activity_id,
            total_participants: agg.total_participants,
            completed_participants: agg.completed_participants,
            total_credits_awarded: agg.total_credits_awarded,
            average_completion: agg.average_progress,
            completion_rate,
            popularity_score: POPULARITY_PARTICIPANT_WEIGHT * total
                + POPULARITY_COMPLETION_WEIGHT * completed,
            last_calculated_at: now,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.last_calculated_at > max_age
    }
}
