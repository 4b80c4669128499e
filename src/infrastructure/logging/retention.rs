//! Cleanup of rolled log files past the retention period.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{debug, info};

use super::logger::LOG_FILE_NAME;

/// Delete rolled log files in `log_dir` last modified before
/// `now - retention_days`. Returns the number of files removed.
pub async fn cleanup_old_logs(log_dir: impl AsRef<Path>, retention_days: u32, now: DateTime<Utc>) -> Result<usize> {
    let log_dir = log_dir.as_ref();
    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = now - Duration::days(i64::from(retention_days));
    let mut deleted = 0;

    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .context("failed to read log directory")?;
    while let Some(entry) = entries.next_entry().await.context("failed to read directory entry")? {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_NAME));
        if !is_log {
            continue;
        }

        let modified: DateTime<Utc> = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .context("failed to read log file metadata")?
            .into();
        if modified < cutoff {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("failed to delete {}", path.display()))?;
            debug!(path = %path.display(), "deleted old log file");
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!(deleted, dir = %log_dir.display(), "log retention cleanup");
    }
    Ok(deleted)
}
