//! In-memory platform collaborators.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainResult, LedgerError};
use crate::domain::models::{UserProfile, UserQuery};
use crate::domain::ports::{CreditLedger, UserDirectory};

/// A grant recorded by [`InMemoryCreditLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerGrant {
    pub user_id: String,
    pub amount: i64,
    pub reason: String,
    pub idempotency_key: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    grants: Vec<LedgerGrant>,
    outage: bool,
    latency: Option<Duration>,
    attempts: u64,
}

/// Credit ledger kept in memory. Idempotent on the grant key.
///
/// `set_outage` and `set_latency` simulate an unreachable or slow ledger.
#[derive(Debug, Default)]
pub struct InMemoryCreditLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryCreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_outage(&self, outage: bool) {
        self.state.write().await.outage = outage;
    }

    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().await.latency = latency;
    }

    /// Sum of credits granted to a user.
    pub async fn balance(&self, user_id: &str) -> i64 {
        self.state
            .read()
            .await
            .grants
            .iter()
            .filter(|g| g.user_id == user_id)
            .map(|g| g.amount)
            .sum()
    }

    pub async fn grants(&self) -> Vec<LedgerGrant> {
        self.state.read().await.grants.clone()
    }

    /// Calls received, including failed and replayed ones.
    pub async fn attempts(&self) -> u64 {
        self.state.read().await.attempts
    }
}

#[async_trait]
impl CreditLedger for InMemoryCreditLedger {
    async fn add_credits(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        idempotency_key: &str,
    ) -> Result<(), LedgerError> {
        let latency = {
            let mut state = self.state.write().await;
            state.attempts += 1;
            if state.outage {
                return Err(LedgerError::Unavailable("simulated outage".to_string()));
            }
            state.latency
        };

        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if state.grants.iter().any(|g| g.idempotency_key == idempotency_key) {
            return Ok(());
        }
        state.grants.push(LedgerGrant {
            user_id: user_id.to_string(),
            amount,
            reason: reason.to_string(),
            idempotency_key: idempotency_key.to_string(),
        });
        Ok(())
    }
}

/// User directory kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id.clone(), u)).collect()),
        }
    }

    pub async fn insert(&self, user: UserProfile) {
        self.users.write().await.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, user_id: &str) -> DomainResult<Option<UserProfile>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn list_users(&self, query: &UserQuery) -> DomainResult<Vec<UserProfile>> {
        let mut users: Vec<UserProfile> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| query.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }
}
