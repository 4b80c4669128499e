//! HTTP client for the platform's credit and user APIs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client as ReqwestClient, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult, LedgerError};
use crate::domain::models::{PlatformConfig, UserProfile, UserQuery};
use crate::domain::ports::{CreditLedger, UserDirectory};

/// Body of `POST /credits/grants`.
#[derive(Debug, Serialize)]
struct GrantRequest<'a> {
    user_id: &'a str,
    amount: i64,
    reason: &'a str,
}

/// Platform API client implementing both [`CreditLedger`] and [`UserDirectory`].
///
/// Grants carry an `Idempotency-Key` header; the platform answers a replayed
/// key with `409 Conflict`, which counts as success.
pub struct HttpPlatformClient {
    http_client: ReqwestClient,
    base_url: String,
    api_token: Option<String>,
    timeout_ms: u64,
}

impl HttpPlatformClient {
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            timeout_ms: config.request_timeout_ms,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn ledger_error(&self, err: &reqwest::Error) -> LedgerError {
        if err.is_timeout() {
            LedgerError::Timeout(self.timeout_ms)
        } else {
            LedgerError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl CreditLedger for HttpPlatformClient {
    async fn add_credits(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        idempotency_key: &str,
    ) -> Result<(), LedgerError> {
        let request = self
            .http_client
            .post(format!("{}/credits/grants", self.base_url))
            .header("Idempotency-Key", idempotency_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&GrantRequest { user_id, amount, reason });

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.ledger_error(&e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            debug!(user_id, amount, idempotency_key, status = status.as_u16(), "credits granted");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        warn!(user_id, amount, status = status.as_u16(), %body, "credit grant failed");

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(LedgerError::Unavailable(format!("{status}: {body}")))
        } else {
            Err(LedgerError::Rejected(format!("{status}: {body}")))
        }
    }
}

#[async_trait]
impl UserDirectory for HttpPlatformClient {
    async fn get_user(&self, user_id: &str) -> DomainResult<Option<UserProfile>> {
        let request = self.http_client.get(format!("{}/users/{}", self.base_url, user_id));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| DomainError::Internal(format!("user directory unreachable: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let profile = response
                    .json::<UserProfile>()
                    .await
                    .map_err(|e| DomainError::SerializationError(format!("user profile: {e}")))?;
                Ok(Some(profile))
            }
            status => Err(DomainError::Internal(format!("user directory returned {status} for {user_id}"))),
        }
    }

    async fn list_users(&self, query: &UserQuery) -> DomainResult<Vec<UserProfile>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(after) = query.created_after {
            params.push(("created_after", after.to_rfc3339()));
        }
        if let Some(level) = query.min_level {
            params.push(("min_level", level.to_string()));
        }
        if let Some(codes) = &query.school_codes {
            params.push(("school_codes", codes.join(",")));
        }

        let request = self.http_client.get(format!("{}/users", self.base_url)).query(&params);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| DomainError::Internal(format!("user directory unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::Internal(format!("user directory returned {status} for bulk query")));
        }

        let users = response
            .json::<Vec<UserProfile>>()
            .await
            .map_err(|e| DomainError::SerializationError(format!("user list: {e}")))?;

        // The platform may ignore filters it does not support.
        Ok(users.into_iter().filter(|u| query.matches(u)).collect())
    }
}
