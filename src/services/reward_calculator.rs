//! Reward calculator.
//!
//! Pure arithmetic over the reward rule and participation progress. Budget
//! is enforced by the caller, inside the participation transaction.

use crate::domain::models::RewardRule;

/// Credits earned by a qualifying event at the given progress.
///
/// `base`, then `floor(base * multiplier)`, then `floor(r * progress / 100)`
/// when progress-based and `progress > 0`. Never negative.
pub fn calculate_reward(rule: &RewardRule, progress: u32) -> i64 {
    let mut reward = rule.base_credits.max(0);

    if let Some(multiplier) = rule.multiplier {
        reward = (reward as f64 * multiplier).floor() as i64;
    }

    if rule.progress_based && progress > 0 {
        reward = (i128::from(reward) * i128::from(progress) / 100) as i64;
    }

    reward.max(0)
}
