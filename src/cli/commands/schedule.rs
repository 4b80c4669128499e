//! Schedule CLI commands: inspect schedules and drive the scheduler.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use tracing::info;

use crate::cli::commands::{open_engine, resolve_activity_id};
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::domain::models::{ActivitySchedule, Config, ScheduleStatus, TickReport};
use crate::domain::ports::ScheduleFilter;
use crate::services::{SchedulerEvent, StopReason};

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    #[command(subcommand)]
    pub command: ScheduleCommands,
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// List schedules
    List {
        /// Only schedules of this activity (ID or prefix)
        #[arg(long)]
        activity: Option<String>,

        /// Filter by status (pending, executing, completed, failed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Run one scheduler tick now
    Tick,

    /// Run the scheduler until interrupted
    Run {
        /// Seconds between ticks (defaults to scheduler.tick_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Fail schedules stuck in executing past the grace period
    Recover,
}

#[derive(Debug, serde::Serialize)]
pub struct ScheduleListOutput {
    pub schedules: Vec<ActivitySchedule>,
    pub total: usize,
}

impl CommandOutput for ScheduleListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "activity", "scheduled", "status", "executed", "error"]);
        for s in &self.schedules {
            let id = s.id.to_string();
            let activity_id = s.activity_id.to_string();
            table.add_row(vec![
                short_id(&id).to_string(),
                short_id(&activity_id).to_string(),
                s.scheduled_time.to_rfc3339(),
                s.status.as_str().to_string(),
                s.executed_time
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                s.error_message
                    .as_deref()
                    .map(|e| truncate(e, 30))
                    .unwrap_or_default(),
            ]);
        }
        render_list("schedule", table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TickOutput {
    #[serde(flatten)]
    pub report: TickReport,
}

impl CommandOutput for TickOutput {
    fn to_human(&self) -> String {
        let r = &self.report;
        if r.is_idle() {
            return "Nothing to do.".to_string();
        }
        format!(
            "Tick complete: {} activated, {} executed ({} participations), {} failed, {} regenerated, {} recovered, {} expired",
            r.activated, r.executed, r.participations, r.failed, r.regenerated, r.recovered, r.expired
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RunSummaryOutput {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub schedules_executed: u64,
    pub participations: u64,
    pub stop_reason: String,
}

impl CommandOutput for RunSummaryOutput {
    fn to_human(&self) -> String {
        format!(
            "Scheduler stopped ({}) after {} tick(s): {} schedule(s) executed, {} participation(s), {} failed tick(s)",
            self.stop_reason, self.ticks, self.schedules_executed, self.participations, self.failed_ticks
        )
    }
}

pub async fn execute(args: ScheduleArgs, config: &Config, json_mode: bool) -> Result<()> {
    let engine = open_engine(config).await?;

    match args.command {
        ScheduleCommands::List { activity, status } => {
            let activity_id = match activity {
                Some(ref a) => Some(resolve_activity_id(&engine, a).await?),
                None => None,
            };
            let filter = ScheduleFilter {
                activity_id,
                status: status
                    .as_deref()
                    .map(|s| ScheduleStatus::from_str(s).with_context(|| format!("Unknown schedule status '{s}'")))
                    .transpose()?,
            };
            let schedules = engine.schedules().list(filter).await?;
            let out = ScheduleListOutput {
                total: schedules.len(),
                schedules,
            };
            output(&out, json_mode);
        }

        ScheduleCommands::Tick => {
            let report = engine.scheduler().tick(Utc::now()).await?;
            output(&TickOutput { report }, json_mode);
        }

        ScheduleCommands::Recover => {
            let report = engine.scheduler().recover_stale_schedules(Utc::now()).await?;
            output(&TickOutput { report }, json_mode);
        }

        ScheduleCommands::Run { interval } => {
            let mut daemon = engine.daemon();
            if let Some(secs) = interval {
                daemon = daemon.with_tick_interval(std::time::Duration::from_secs(secs.max(1)));
            }
            let handle = daemon.handle();
            let mut events = daemon.run();

            let ctrl_c_handle = handle.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown signal received");
                    ctrl_c_handle.stop();
                }
            });

            let mut stop_reason = StopReason::Requested;
            while let Some(event) = events.recv().await {
                match event {
                    SchedulerEvent::TickCompleted { report, .. } if !report.is_idle() && !json_mode => {
                        println!("{}", TickOutput { report }.to_human());
                    }
                    SchedulerEvent::TickFailed { tick_number, error } if !json_mode => {
                        eprintln!("Tick {tick_number} failed: {error}");
                    }
                    SchedulerEvent::Stopped { reason } => {
                        stop_reason = reason;
                        break;
                    }
                    _ => {}
                }
            }

            let status = handle.status().await;
            let out = RunSummaryOutput {
                ticks: status.total_ticks,
                failed_ticks: status.failed_ticks,
                schedules_executed: status.schedules_executed,
                participations: status.participations,
                stop_reason: match stop_reason {
                    StopReason::Requested => "requested".to_string(),
                    StopReason::TooManyFailures => "too many failures".to_string(),
                },
            };
            output(&out, json_mode);
            if stop_reason == StopReason::TooManyFailures {
                anyhow::bail!("Scheduler stopped after repeated tick failures");
            }
        }
    }

    Ok(())
}
