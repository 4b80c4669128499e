//! User snapshot consumed by target evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the engine knows about a user at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Current credit level as reported by the platform.
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub school_code: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            level: 0,
            school_code: None,
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_school(mut self, school_code: impl Into<String>) -> Self {
        self.school_code = Some(school_code.into());
        self
    }
}

/// Bulk user query, narrowed from a target rule where the directory can help.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuery {
    pub created_after: Option<DateTime<Utc>>,
    pub min_level: Option<i32>,
    pub school_codes: Option<Vec<String>>,
}

impl UserQuery {
    pub fn matches(&self, user: &UserProfile) -> bool {
        if let Some(after) = self.created_after {
            if user.created_at < after {
                return false;
            }
        }
        if let Some(min) = self.min_level {
            if user.level < min {
                return false;
            }
        }
        if let Some(codes) = &self.school_codes {
            match &user.school_code {
                Some(code) if codes.contains(code) => {}
                _ => return false,
            }
        }
        true
    }
}
