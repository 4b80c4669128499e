//! Target evaluator: decides whether a user may take part in an activity.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::{TargetRule, UserProfile, UserQuery};

/// Eligibility predicate for activities with a `Custom` target rule.
pub type CustomPredicate = Arc<dyn Fn(&UserProfile) -> bool + Send + Sync>;

/// Pure eligibility check over a user snapshot.
///
/// Custom predicates are registered per activity before the evaluator is
/// shared; a `Custom` rule without a registered predicate admits everyone.
#[derive(Clone)]
pub struct TargetEvaluator {
    new_user_window: Duration,
    custom: HashMap<Uuid, CustomPredicate>,
}

impl fmt::Debug for TargetEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetEvaluator")
            .field("new_user_window", &self.new_user_window)
            .field("custom_predicates", &self.custom.len())
            .finish()
    }
}

impl Default for TargetEvaluator {
    fn default() -> Self {
        Self::new(30)
    }
}

impl TargetEvaluator {
    pub fn new(new_user_window_days: u32) -> Self {
        Self {
            new_user_window: Duration::days(i64::from(new_user_window_days)),
            custom: HashMap::new(),
        }
    }

    pub fn with_custom_predicate(
        mut self,
        activity_id: Uuid,
        predicate: impl Fn(&UserProfile) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.custom.insert(activity_id, Arc::new(predicate));
        self
    }

    pub fn is_eligible(
        &self,
        activity_id: Uuid,
        rule: &TargetRule,
        user: &UserProfile,
        now: DateTime<Utc>,
    ) -> bool {
        match rule {
            TargetRule::All => true,
            TargetRule::NewUsers => now - user.created_at <= self.new_user_window,
            TargetRule::ByLevel { min_level } => user.level >= *min_level,
            TargetRule::BySchool { school_codes } => user
                .school_code
                .as_ref()
                .is_some_and(|code| school_codes.contains(code)),
            TargetRule::Custom => self.custom.get(&activity_id).map_or(true, |p| p(user)),
        }
    }

    /// Narrow a bulk user lookup to the rule where the directory can help.
    ///
    /// The result is a superset; callers still check `is_eligible` per user.
    pub fn user_query(&self, rule: &TargetRule, now: DateTime<Utc>) -> UserQuery {
        match rule {
            TargetRule::NewUsers => UserQuery {
                created_after: Some(now - self.new_user_window),
                ..Default::default()
            },
            TargetRule::ByLevel { min_level } => UserQuery {
                min_level: Some(*min_level),
                ..Default::default()
            },
            TargetRule::BySchool { school_codes } => UserQuery {
                school_codes: Some(school_codes.clone()),
                ..Default::default()
            },
            TargetRule::All | TargetRule::Custom => UserQuery::default(),
        }
    }
}
