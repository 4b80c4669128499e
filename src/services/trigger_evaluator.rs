//! Trigger evaluator: decides whether accumulated event details satisfy an
//! activity's firing condition.
//!
//! Counters such as streak length are computed by the event source and
//! arrive in the payload; nothing here reads storage.

use serde_json::Value;

use crate::domain::models::{EventPayload, TriggerRule};

pub const LETTER_ID_KEY: &str = "letter_id";
pub const CONSECUTIVE_DAYS_KEY: &str = "consecutive_days";
pub const CUMULATIVE_COUNT_KEY: &str = "cumulative_count";

/// Where an event came from. Scheduled triggers only fire for scheduler events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    Live,
    Scheduler,
}

pub fn is_triggered(rule: &TriggerRule, details: &EventPayload, origin: EventOrigin) -> bool {
    match rule {
        TriggerRule::Login => true,
        TriggerRule::LetterWritten => details.get(LETTER_ID_KEY).is_some_and(is_present),
        TriggerRule::ConsecutiveDays { required } => {
            counter(details, CONSECUTIVE_DAYS_KEY).is_some_and(|n| n >= u64::from(*required))
        }
        TriggerRule::CumulativeCount { required } => {
            counter(details, CUMULATIVE_COUNT_KEY).is_some_and(|n| n >= u64::from(*required))
        }
        TriggerRule::Scheduled => origin == EventOrigin::Scheduler,
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(_) => true,
        _ => false,
    }
}

/// Read a non-negative counter, accepting numeric strings.
fn counter(details: &EventPayload, key: &str) -> Option<u64> {
    match details.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
