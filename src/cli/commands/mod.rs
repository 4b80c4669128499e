//! CLI command implementations.

pub mod activity;
pub mod event;
pub mod init;
pub mod rewards;
pub mod schedule;
pub mod stats;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::platform::HttpPlatformClient;
use crate::adapters::sqlite::initialize_database;
use crate::domain::models::Config;
use crate::domain::ports::ActivityFilter;
use crate::services::ActivityEngine;

/// Open the configured database and platform client as one engine.
pub async fn open_engine(config: &Config) -> Result<ActivityEngine> {
    let pool = initialize_database(&config.database)
        .await
        .context("Failed to initialize database. Run 'activity-engine init' first.")?;
    let platform = Arc::new(
        HttpPlatformClient::new(&config.platform).context("Failed to build platform client")?,
    );
    Ok(ActivityEngine::new(pool, platform.clone(), platform, config))
}

/// Resolve a full activity id or a unique prefix of one.
pub async fn resolve_activity_id(engine: &ActivityEngine, id_or_prefix: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(id_or_prefix) {
        return Ok(id);
    }

    let prefix = id_or_prefix.to_lowercase();
    let matches: Vec<Uuid> = engine
        .activities()
        .list(ActivityFilter::default())
        .await?
        .into_iter()
        .map(|a| a.id)
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => anyhow::bail!("No activity matches '{}'", id_or_prefix),
        _ => anyhow::bail!(
            "Ambiguous activity prefix '{}' ({} matches)",
            id_or_prefix,
            matches.len()
        ),
    }
}

pub(crate) fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid datetime '{value}'. Use RFC3339 (e.g., 2026-01-01T09:00:00Z)"))
}

pub(crate) fn parse_payload(value: Option<&str>) -> Result<crate::domain::models::EventPayload> {
    let Some(raw) = value else {
        return Ok(Default::default());
    };
    match serde_json::from_str::<serde_json::Value>(raw).context("Payload must be JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Payload must be a JSON object"),
    }
}
