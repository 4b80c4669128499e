//! Credit ledger port.

use async_trait::async_trait;

use crate::domain::errors::LedgerError;

/// External service that credits user accounts.
///
/// Implementations must be idempotent on `idempotency_key`: a repeated grant
/// with the same key succeeds without paying twice.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn add_credits(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        idempotency_key: &str,
    ) -> Result<(), LedgerError>;
}
