//! User directory port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{UserProfile, UserQuery};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up one user.
    async fn get_user(&self, user_id: &str) -> DomainResult<Option<UserProfile>>;

    /// Bulk lookup used by the scheduler's fan-out.
    async fn list_users(&self, query: &UserQuery) -> DomainResult<Vec<UserProfile>>;
}
