//! Domain errors for the activity engine.

use thiserror::Error;
use uuid::Uuid;

use super::models::ActivityStatus;

/// Domain-level errors that can occur in the activity engine.
///
/// Routine participation outcomes (not eligible, budget exhausted, ...) are
/// not errors; they are reported through
/// [`ParticipationOutcome`](crate::domain::models::ParticipationOutcome).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: ActivityStatus, to: ActivityStatus },

    #[error("Activity {id} cannot start before {start_time}")]
    NotYetStartable { id: Uuid, start_time: String },

    #[error("Activity {id} ended at {end_time} and can no longer be resumed")]
    ActivityExpired { id: Uuid, end_time: String },

    #[error("Activity is active and cannot be deleted: {0}")]
    ActivityStillActive(Uuid),

    #[error("Activity not found: {0}")]
    ActivityNotFound(Uuid),

    #[error("Participation not found: activity {activity_id}, user {user_id}")]
    ParticipationNotFound { activity_id: Uuid, user_id: String },

    #[error("Schedule not found: {0}")]
    ScheduleNotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// SQLite reported `SQLITE_BUSY`/`SQLITE_LOCKED`, or no connection was free.
    #[error("Database busy: {0}")]
    DatabaseBusy(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Stable machine-readable name of the error variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) => "validation_failed",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotYetStartable { .. } => "not_yet_startable",
            Self::ActivityExpired { .. } => "activity_expired",
            Self::ActivityStillActive(_) => "activity_still_active",
            Self::ActivityNotFound(_) => "activity_not_found",
            Self::ParticipationNotFound { .. } => "participation_not_found",
            Self::ScheduleNotFound(_) => "schedule_not_found",
            Self::UserNotFound(_) => "user_not_found",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::DatabaseError(_) => "database_error",
            Self::DatabaseBusy(_) => "database_busy",
            Self::SerializationError(_) => "serialization_error",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the error is transient lock contention worth one more attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseBusy(_))
    }
}

/// Primary SQLite result codes for lock contention.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// Whether a (possibly extended) SQLite result code is busy or locked.
fn is_busy_code(code: &str) -> bool {
    code.parse::<i64>()
        .is_ok_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        let busy = match &err {
            sqlx::Error::Database(db) => db.code().is_some_and(|code| is_busy_code(&code)),
            sqlx::Error::PoolTimedOut => true,
            _ => false,
        };
        if busy {
            DomainError::DatabaseBusy(err.to_string())
        } else {
            DomainError::DatabaseError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Errors reported by the external credit ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Credit ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Credit ledger rejected the grant: {0}")]
    Rejected(String),

    #[error("Credit ledger timed out after {0}ms")]
    Timeout(u64),
}
