//! Activity schedule domain model.
//!
//! A schedule row is one due (or executed) occurrence of a scheduled-trigger
//! or repeating activity. The scheduler claims pending rows, runs them, and
//! inserts the next occurrence for repeating activities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution status of a schedule occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "executing" => Some(Self::Executing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySchedule {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub scheduled_time: DateTime<Utc>,
    pub status: ScheduleStatus,
    /// When execution started; used to detect interrupted runs.
    pub started_at: Option<DateTime<Utc>>,
    pub executed_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivitySchedule {
    pub fn new(activity_id: Uuid, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            activity_id,
            scheduled_time,
            status: ScheduleStatus::Pending,
            started_at: None,
            executed_time: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Pending && self.scheduled_time <= now
    }
}

/// Summary of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub recovered: usize,
    pub activated: usize,
    pub executed: usize,
    pub failed: usize,
    pub regenerated: usize,
    pub participations: usize,
    pub expired: usize,
}

impl TickReport {
    /// Add the counters of a partial report.
    pub fn absorb(&mut self, other: TickReport) {
        self.recovered += other.recovered;
        self.activated += other.activated;
        self.executed += other.executed;
        self.failed += other.failed;
        self.regenerated += other.regenerated;
        self.participations += other.participations;
        self.expired += other.expired;
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}
