//! Activity domain model.
//!
//! An activity is a time-boxed reward campaign. Its status moves through a
//! fixed transition table; `completed` and `cancelled` are terminal.

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rules::{RewardRule, TargetRule, TriggerKind, TriggerRule};
use crate::domain::errors::{DomainError, DomainResult};

/// Lifecycle status of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// Being configured; not visible to users.
    Draft,
    /// Published and waiting for its start time.
    Pending,
    /// Accepting participation.
    Active,
    /// Temporarily not accepting participation.
    Paused,
    /// Finished normally.
    Completed,
    /// Abandoned before finishing.
    Cancelled,
}

impl Default for ActivityStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl ActivityStatus {
    pub const ALL: [ActivityStatus; 6] = [
        Self::Draft,
        Self::Pending,
        Self::Active,
        Self::Paused,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" | "complete" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<ActivityStatus> {
        match self {
            Self::Draft => vec![Self::Pending, Self::Cancelled],
            Self::Pending => vec![Self::Active, Self::Cancelled],
            Self::Active => vec![Self::Paused, Self::Completed],
            Self::Paused => vec![Self::Active, Self::Completed, Self::Cancelled],
            Self::Completed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Campaign category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    DailyCheckIn,
    LetterChallenge,
    Streak,
    Milestone,
    ScheduledDrop,
    Custom,
}

impl Default for ActivityKind {
    fn default() -> Self {
        Self::Custom
    }
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyCheckIn => "daily_check_in",
            Self::LetterChallenge => "letter_challenge",
            Self::Streak => "streak",
            Self::Milestone => "milestone",
            Self::ScheduledDrop => "scheduled_drop",
            Self::Custom => "custom",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "daily_check_in" | "checkin" | "check_in" => Some(Self::DailyCheckIn),
            "letter_challenge" => Some(Self::LetterChallenge),
            "streak" => Some(Self::Streak),
            "milestone" => Some(Self::Milestone),
            "scheduled_drop" => Some(Self::ScheduledDrop),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// How an activity recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepeatPattern {
    None,
    Daily,
    Weekly,
    Monthly,
    CustomHours { hours: u32 },
}

impl Default for RepeatPattern {
    fn default() -> Self {
        Self::None
    }
}

impl RepeatPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::CustomHours { .. } => "custom",
        }
    }

    /// Parse `none`, `daily`, `weekly`, `monthly` or an hour interval such as `6h`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "none" | "" => Some(Self::None),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            other => other
                .strip_suffix('h')
                .and_then(|n| n.parse().ok())
                .map(|hours| Self::CustomHours { hours }),
        }
    }

    pub fn is_repeating(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn description(&self) -> String {
        match self {
            Self::CustomHours { hours } => format!("every {hours} hour(s)"),
            other => other.as_str().to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::CustomHours { hours: 0 } => {
                Err("Custom repeat interval must be at least 1 hour".to_string())
            }
            _ => Ok(()),
        }
    }

    /// The `index`-th occurrence counted from `anchor` (index 0 is the anchor).
    ///
    /// Occurrences are always computed from the anchor, never from the
    /// previous occurrence, so the time of day cannot drift.
    pub fn occurrence(&self, anchor: DateTime<Utc>, index: u32) -> Option<DateTime<Utc>> {
        match self {
            Self::None => (index == 0).then_some(anchor),
            Self::Daily => anchor.checked_add_signed(Duration::days(i64::from(index))),
            Self::Weekly => anchor.checked_add_signed(Duration::weeks(i64::from(index))),
            Self::Monthly => anchor.checked_add_months(Months::new(index)),
            Self::CustomHours { hours } => {
                anchor.checked_add_signed(Duration::hours(i64::from(*hours) * i64::from(index)))
            }
        }
    }

    /// First occurrence strictly after `after`.
    pub fn next_after(&self, anchor: DateTime<Utc>, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_repeating() {
            return None;
        }

        let elapsed = after - anchor;
        let estimate = match self {
            Self::None => 0,
            Self::Daily => elapsed.num_days(),
            Self::Weekly => elapsed.num_weeks(),
            Self::Monthly => {
                let months = (after.year() - anchor.year()) * 12
                    + after.month() as i32
                    - anchor.month() as i32;
                i64::from(months) - 1
            }
            Self::CustomHours { hours } => elapsed.num_hours() / i64::from((*hours).max(1)),
        };

        let mut index = u32::try_from(estimate.max(0)).ok()?;
        loop {
            let candidate = self.occurrence(anchor, index)?;
            if candidate > after {
                return Some(candidate);
            }
            index = index.checked_add(1)?;
        }
    }
}

/// How many rewards one user may earn from an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardCap {
    /// One reward, after which the participation is completed.
    Single,
    /// Up to `n` rewards, one per qualifying event.
    Bounded(u32),
    /// One reward per qualifying event, without limit.
    Unlimited,
}

/// A reward campaign definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub kind: ActivityKind,

    // -- Rules --
    pub target_rule: TargetRule,
    pub trigger_rule: TriggerRule,
    pub reward_rule: RewardRule,

    // -- Limits --
    /// Total credits the activity may disburse; `None` means uncapped.
    pub budget: Option<i64>,
    /// Credits already reserved for disbursement.
    pub consumed_budget: i64,
    pub max_participants: Option<u32>,
    /// `None` or `1`: single completion. `0`: unlimited. `n`: up to `n` rewards.
    pub max_rewards_per_user: Option<u32>,

    // -- Lifecycle --
    pub status: ActivityStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub repeat_pattern: RepeatPattern,
    pub repeat_end_date: Option<DateTime<Utc>>,
    /// Higher priority activities are evaluated first for the same event.
    pub priority: i32,

    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Activity {
    /// Create a new draft activity.
    pub fn new(
        name: impl Into<String>,
        trigger_rule: TriggerRule,
        reward_rule: RewardRule,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            kind: ActivityKind::default(),
            target_rule: TargetRule::All,
            trigger_rule,
            reward_rule,
            budget: None,
            consumed_budget: 0,
            max_participants: None,
            max_rewards_per_user: None,
            status: ActivityStatus::Draft,
            start_time,
            end_time,
            repeat_pattern: RepeatPattern::None,
            repeat_end_date: None,
            priority: 0,
            created_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 1,
        }
    }

    // Builder methods
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_kind(mut self, kind: ActivityKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_target(mut self, target_rule: TargetRule) -> Self {
        self.target_rule = target_rule;
        self
    }

    pub fn with_budget(mut self, budget: i64) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_max_participants(mut self, max: u32) -> Self {
        self.max_participants = Some(max);
        self
    }

    pub fn with_max_rewards_per_user(mut self, max: u32) -> Self {
        self.max_rewards_per_user = Some(max);
        self
    }

    pub fn with_repeat(mut self, pattern: RepeatPattern, until: Option<DateTime<Utc>>) -> Self {
        self.repeat_pattern = pattern;
        self.repeat_end_date = until;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_creator(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn trigger_kind(&self) -> TriggerKind {
        self.trigger_rule.kind()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Active status and `now` within `[start_time, end_time]`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ActivityStatus::Active
            && !self.is_deleted()
            && self.start_time <= now
            && now <= self.end_time
    }

    pub fn reward_cap(&self) -> RewardCap {
        match self.max_rewards_per_user {
            None | Some(1) => RewardCap::Single,
            Some(0) => RewardCap::Unlimited,
            Some(n) => RewardCap::Bounded(n),
        }
    }

    /// Credits still available, `None` when uncapped.
    pub fn remaining_budget(&self) -> Option<i64> {
        self.budget.map(|b| (b - self.consumed_budget).max(0))
    }

    /// Whether this activity needs schedule rows driving it.
    pub fn needs_schedule(&self) -> bool {
        self.trigger_kind() == TriggerKind::Scheduled || self.repeat_pattern.is_repeating()
    }

    pub fn can_transition_to(&self, new_status: ActivityStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, updating the timestamp.
    pub fn transition_to(&mut self, new_status: ActivityStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.can_transition_to(new_status) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }
        self.status = new_status;
        self.updated_at = now;
        Ok(())
    }

    /// Validate the definition; returns the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Activity name cannot be empty".to_string());
        }
        if self.start_time > self.end_time {
            return Err(format!(
                "start_time {} is after end_time {}",
                self.start_time.to_rfc3339(),
                self.end_time.to_rfc3339()
            ));
        }
        if let Some(budget) = self.budget {
            if budget < 0 {
                return Err(format!("budget must be non-negative, got {budget}"));
            }
            if self.consumed_budget > budget {
                return Err(format!(
                    "budget {budget} is below the {} credits already consumed",
                    self.consumed_budget
                ));
            }
        }
        if let Some(until) = self.repeat_end_date {
            if until < self.start_time {
                return Err("repeat_end_date cannot be before start_time".to_string());
            }
        }
        self.target_rule.validate()?;
        self.trigger_rule.validate()?;
        self.reward_rule.validate()?;
        self.repeat_pattern.validate()?;
        Ok(())
    }
}
