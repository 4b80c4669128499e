//! Typed activity rules.
//!
//! Target, trigger and reward rules are closed sets of tagged variants that
//! are validated once, when an activity is created or updated. They are stored
//! as JSON objects tagged by `type`.

use serde::{Deserialize, Serialize};

/// Which users may participate in an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetRule {
    /// Every user.
    All,
    /// Users whose account is younger than the new-user window.
    NewUsers,
    /// Users whose credit level is at least `min_level`.
    ByLevel { min_level: i32 },
    /// Users enrolled in one of the listed schools.
    BySchool { school_codes: Vec<String> },
    /// Eligibility decided by a predicate registered for the activity.
    Custom,
}

impl Default for TargetRule {
    fn default() -> Self {
        Self::All
    }
}

impl TargetRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::NewUsers => "new_users",
            Self::ByLevel { .. } => "by_level",
            Self::BySchool { .. } => "by_school",
            Self::Custom => "custom",
        }
    }

    /// Human-readable description of the rule.
    pub fn description(&self) -> String {
        match self {
            Self::All => "all users".to_string(),
            Self::NewUsers => "new users".to_string(),
            Self::ByLevel { min_level } => format!("level >= {min_level}"),
            Self::BySchool { school_codes } => format!("schools: {}", school_codes.join(", ")),
            Self::Custom => "custom predicate".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::ByLevel { min_level } if *min_level < 0 => {
                Err(format!("min_level must be non-negative, got {min_level}"))
            }
            Self::BySchool { school_codes } => {
                if school_codes.is_empty() {
                    return Err("BySchool target requires at least one school code".to_string());
                }
                if school_codes.iter().any(|c| c.trim().is_empty()) {
                    return Err("School codes cannot be blank".to_string());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Flat trigger discriminant, used to look up activities for an incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Login,
    LetterWritten,
    ConsecutiveDays,
    CumulativeCount,
    Scheduled,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::LetterWritten => "letter_written",
            Self::ConsecutiveDays => "consecutive_days",
            Self::CumulativeCount => "cumulative_count",
            Self::Scheduled => "scheduled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "login" => Some(Self::Login),
            "letter_written" | "letter" => Some(Self::LetterWritten),
            "consecutive_days" | "streak" => Some(Self::ConsecutiveDays),
            "cumulative_count" | "cumulative" => Some(Self::CumulativeCount),
            "scheduled" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The condition under which an event earns progress and reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerRule {
    Login,
    LetterWritten,
    ConsecutiveDays { required: u32 },
    CumulativeCount { required: u32 },
    Scheduled,
}

impl TriggerRule {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Login => TriggerKind::Login,
            Self::LetterWritten => TriggerKind::LetterWritten,
            Self::ConsecutiveDays { .. } => TriggerKind::ConsecutiveDays,
            Self::CumulativeCount { .. } => TriggerKind::CumulativeCount,
            Self::Scheduled => TriggerKind::Scheduled,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Login => "on login".to_string(),
            Self::LetterWritten => "on letter written".to_string(),
            Self::ConsecutiveDays { required } => format!("{required} consecutive days"),
            Self::CumulativeCount { required } => format!("{required} cumulative actions"),
            Self::Scheduled => "on schedule".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::ConsecutiveDays { required } | Self::CumulativeCount { required }
                if *required == 0 =>
            {
                Err(format!("{} trigger requires a threshold of at least 1", self.kind()))
            }
            _ => Ok(()),
        }
    }
}

/// How many credits a qualifying event is worth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRule {
    pub base_credits: i64,
    #[serde(default)]
    pub multiplier: Option<f64>,
    /// Scale the reward by `progress / 100`.
    #[serde(default)]
    pub progress_based: bool,
}

impl RewardRule {
    pub fn fixed(base_credits: i64) -> Self {
        Self {
            base_credits,
            multiplier: None,
            progress_based: false,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    pub fn progress_based(mut self) -> Self {
        self.progress_based = true;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_credits < 0 {
            return Err(format!(
                "reward credits must be non-negative, got {}",
                self.base_credits
            ));
        }
        if let Some(m) = self.multiplier {
            if !m.is_finite() || m <= 0.0 {
                return Err(format!("reward multiplier must be a positive number, got {m}"));
            }
        }
        Ok(())
    }
}

impl Default for RewardRule {
    fn default() -> Self {
        Self::fixed(0)
    }
}
