//! Reward CLI commands.

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};

use crate::cli::commands::open_engine;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{ActivityAction, Config, PendingReward};
use crate::domain::ports::ActivityLogFilter;
use crate::services::ReconcileReport;

#[derive(Args, Debug)]
pub struct RewardsArgs {
    #[command(subcommand)]
    pub command: RewardsCommands,
}

#[derive(Subcommand, Debug)]
pub enum RewardsCommands {
    /// Retry every deferred reward not yet disbursed
    Reconcile,

    /// List rewards flagged for retry
    Pending,
}

#[derive(Debug, serde::Serialize)]
pub struct ReconcileOutput {
    #[serde(flatten)]
    pub report: ReconcileReport,
}

impl CommandOutput for ReconcileOutput {
    fn to_human(&self) -> String {
        let r = &self.report;
        if r.attempted == 0 {
            return "No pending rewards.".to_string();
        }
        format!(
            "Reconciled {} of {} pending reward(s); {} still pending",
            r.reconciled, r.attempted, r.still_pending
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct PendingOutput {
    pub rewards: Vec<PendingReward>,
    pub total: usize,
}

impl CommandOutput for PendingOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["user", "credits", "reason", "idempotency key"]);
        for r in &self.rewards {
            table.add_row(vec![
                truncate(&r.user_id, 20),
                r.credits.to_string(),
                truncate(&r.reason, 24),
                r.idempotency_key.clone(),
            ]);
        }
        render_list("pending reward", table, self.total)
    }
}

pub async fn execute(args: RewardsArgs, config: &Config, json_mode: bool) -> Result<()> {
    let engine = open_engine(config).await?;

    match args.command {
        RewardsCommands::Reconcile => {
            let report = engine.participation().reconcile_pending_rewards(Utc::now()).await?;
            output(&ReconcileOutput { report }, json_mode);
        }

        RewardsCommands::Pending => {
            let logs = engine.logs();
            let settled: Vec<String> = logs
                .list(ActivityLogFilter {
                    action: Some(ActivityAction::RewardReconciled),
                    ..Default::default()
                })
                .await?
                .iter()
                .filter_map(|e| e.details.get("idempotency_key")?.as_str().map(str::to_string))
                .collect();
            let rewards: Vec<PendingReward> = logs
                .list(ActivityLogFilter {
                    action: Some(ActivityAction::RewardPendingRetry),
                    ..Default::default()
                })
                .await?
                .iter()
                .filter_map(PendingReward::from_log)
                .filter(|r| !settled.contains(&r.idempotency_key))
                .collect();
            let out = PendingOutput {
                total: rewards.len(),
                rewards,
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}
