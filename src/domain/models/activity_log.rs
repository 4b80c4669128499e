//! Append-only audit trail of engine mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Type of mutation recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Create,
    Update,
    Delete,
    Publish,
    Start,
    Pause,
    Resume,
    Complete,
    Cancel,
    Participate,
    RewardPendingRetry,
    RewardReconciled,
    ScheduleExecuted,
    ScheduleFailed,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Publish => "publish",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::Participate => "participate",
            Self::RewardPendingRetry => "reward_pending_retry",
            Self::RewardReconciled => "reward_reconciled",
            Self::ScheduleExecuted => "schedule_executed",
            Self::ScheduleFailed => "schedule_failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "publish" => Some(Self::Publish),
            "start" => Some(Self::Start),
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "complete" => Some(Self::Complete),
            "cancel" => Some(Self::Cancel),
            "participate" => Some(Self::Participate),
            "reward_pending_retry" => Some(Self::RewardPendingRetry),
            "reward_reconciled" => Some(Self::RewardReconciled),
            "schedule_executed" => Some(Self::ScheduleExecuted),
            "schedule_failed" => Some(Self::ScheduleFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub user_id: Option<String>,
    pub action: ActivityAction,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new(activity_id: Uuid, action: ActivityAction, details: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            activity_id,
            user_id: None,
            action,
            details,
            created_at: Utc::now(),
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}

/// A reward whose disbursement failed and awaits reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReward {
    pub activity_id: Uuid,
    pub user_id: String,
    pub credits: i64,
    pub reason: String,
    pub idempotency_key: String,
}

impl PendingReward {
    /// Recover a pending reward from its `reward_pending_retry` log entry.
    pub fn from_log(entry: &ActivityLog) -> Option<Self> {
        if entry.action != ActivityAction::RewardPendingRetry {
            return None;
        }
        Some(Self {
            activity_id: entry.activity_id,
            user_id: entry.user_id.clone()?,
            credits: entry.details.get("credits")?.as_i64()?,
            reason: entry
                .details
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            idempotency_key: entry.details.get("idempotency_key")?.as_str()?.to_string(),
        })
    }
}
