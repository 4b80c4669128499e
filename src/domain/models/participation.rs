//! Participation domain model.
//!
//! One row per (activity, user). Progress counts qualifying-or-attempted
//! events; `progress_details` accumulates the event payloads, last write wins
//! per key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form key/value payload describing an event.
pub type EventPayload = Map<String, Value>;

/// A user's engagement with one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub user_id: String,
    pub participated_at: DateTime<Utc>,
    pub progress: u32,
    pub progress_details: EventPayload,
    pub reward_credits: i64,
    /// Rewards granted so far; the per-user cap counts these, not events.
    pub rewards_granted: u32,
    /// `None` while the participation is still in progress.
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Participation {
    pub fn new(activity_id: Uuid, user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            activity_id,
            user_id: user_id.into(),
            participated_at: now,
            progress: 0,
            progress_details: Map::new(),
            reward_credits: 0,
            rewards_granted: 0,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Merge an event into the accumulated details and count it.
    pub fn record_event(&mut self, payload: &EventPayload, now: DateTime<Utc>) {
        for (key, value) in payload {
            self.progress_details.insert(key.clone(), value.clone());
        }
        self.progress = self.progress.saturating_add(1);
        self.updated_at = now;
    }

    /// Credit a granted reward.
    pub fn grant(&mut self, credits: i64, complete: bool, now: DateTime<Utc>) {
        self.reward_credits += credits;
        self.rewards_granted = self.rewards_granted.saturating_add(1);
        if complete {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
    }

    /// Idempotency key for the reward earned by the current event.
    pub fn idempotency_key(&self) -> String {
        format!(
            "activity:{}:user:{}:event:{}",
            self.activity_id, self.user_id, self.progress
        )
    }
}

/// Why a participation attempt was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationRejection {
    ActivityNotActive,
    NotEligible,
    ActivityFull,
    MaxParticipationReached,
    AlreadyCompleted,
}

impl ParticipationRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActivityNotActive => "activity_not_active",
            Self::NotEligible => "not_eligible",
            Self::ActivityFull => "activity_full",
            Self::MaxParticipationReached => "max_participation_reached",
            Self::AlreadyCompleted => "already_completed",
        }
    }
}

impl std::fmt::Display for ParticipationRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single `participate` call.
///
/// These are routine results, reported to the caller as values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParticipationOutcome {
    /// The trigger fired and the credits were disbursed.
    Rewarded { credits: i64, progress: u32 },
    /// Progress recorded; the trigger condition is not met yet.
    Progressed { progress: u32 },
    /// The trigger fired but the activity budget cannot cover the reward.
    BudgetExhausted { progress: u32 },
    /// Budget reserved, but the ledger could not be reached; flagged for retry.
    RewardDeferred {
        credits: i64,
        progress: u32,
        idempotency_key: String,
    },
    /// Nothing was recorded.
    Rejected { reason: ParticipationRejection },
}

impl ParticipationOutcome {
    pub fn rejected(reason: ParticipationRejection) -> Self {
        Self::Rejected { reason }
    }

    pub fn is_rewarded(&self) -> bool {
        matches!(self, Self::Rewarded { .. })
    }

    /// Credits granted or reserved by this call.
    pub fn credits(&self) -> i64 {
        match self {
            Self::Rewarded { credits, .. } | Self::RewardDeferred { credits, .. } => *credits,
            _ => 0,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Rewarded { credits, .. } => format!("rewarded {credits}"),
            Self::Progressed { progress } => format!("progress {progress}"),
            Self::BudgetExhausted { .. } => "budget exhausted".to_string(),
            Self::RewardDeferred { credits, .. } => format!("reward {credits} deferred"),
            Self::Rejected { reason } => reason.to_string(),
        }
    }
}

/// Aggregate figures over all participations of one activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipationAggregate {
    pub total_participants: u64,
    pub completed_participants: u64,
    pub total_credits_awarded: i64,
    pub average_progress: f64,
}
