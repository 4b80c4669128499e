//! Statistics CLI commands.

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};
use std::collections::HashMap;

use crate::cli::commands::{open_engine, resolve_activity_id};
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::domain::models::{ActivityStatistics, Config};
use crate::domain::ports::ActivityFilter;

#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(subcommand)]
    pub command: StatsCommands,
}

#[derive(Subcommand, Debug)]
pub enum StatsCommands {
    /// Show statistics of one activity
    Show {
        /// Activity ID or prefix
        id: String,
    },

    /// List statistics of all activities, most popular first
    List,

    /// Recompute cached statistics
    Refresh {
        /// Only this activity (ID or prefix)
        id: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct StatsOutput {
    pub name: Option<String>,
    #[serde(flatten)]
    pub stats: ActivityStatistics,
}

impl CommandOutput for StatsOutput {
    fn to_human(&self) -> String {
        let s = &self.stats;
        let mut lines = Vec::new();
        if let Some(ref name) = self.name {
            lines.push(format!("Activity: {}", name));
        }
        lines.push(format!("ID: {}", s.activity_id));
        lines.push(format!("Participants: {}", s.total_participants));
        lines.push(format!("Completed: {}", s.completed_participants));
        lines.push(format!("Completion rate: {:.1}%", s.completion_rate * 100.0));
        lines.push(format!("Average progress: {:.2}", s.average_completion));
        lines.push(format!("Credits awarded: {}", s.total_credits_awarded));
        lines.push(format!("Popularity: {:.1}", s.popularity_score));
        lines.push(format!("Calculated: {}", s.last_calculated_at.to_rfc3339()));
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct StatsListOutput {
    pub statistics: Vec<StatsOutput>,
    pub total: usize,
}

impl CommandOutput for StatsListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "participants", "completed", "rate", "credits", "popularity"]);
        for entry in &self.statistics {
            let s = &entry.stats;
            let id = s.activity_id.to_string();
            table.add_row(vec![
                short_id(&id).to_string(),
                entry.name.as_deref().map(|n| truncate(n, 24)).unwrap_or_default(),
                s.total_participants.to_string(),
                s.completed_participants.to_string(),
                format!("{:.1}%", s.completion_rate * 100.0),
                s.total_credits_awarded.to_string(),
                format!("{:.1}", s.popularity_score),
            ]);
        }
        render_list("activity", table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RefreshOutput {
    pub refreshed: usize,
}

impl CommandOutput for RefreshOutput {
    fn to_human(&self) -> String {
        format!("Refreshed statistics for {} activity(ies)", self.refreshed)
    }
}

pub async fn execute(args: StatsArgs, config: &Config, json_mode: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let now = Utc::now();

    match args.command {
        StatsCommands::Show { id } => {
            let id = resolve_activity_id(&engine, &id).await?;
            let name = engine.activities().get(id).await?.name;
            let stats = engine.statistics().get(id, now).await?;
            output(&StatsOutput { name: Some(name), stats }, json_mode);
        }

        StatsCommands::List => {
            let names: HashMap<_, _> = engine
                .activities()
                .list(ActivityFilter::default())
                .await?
                .into_iter()
                .map(|a| (a.id, a.name))
                .collect();
            let statistics: Vec<StatsOutput> = engine
                .statistics()
                .get_all(now)
                .await?
                .into_iter()
                .map(|stats| StatsOutput {
                    name: names.get(&stats.activity_id).cloned(),
                    stats,
                })
                .collect();
            let out = StatsListOutput {
                total: statistics.len(),
                statistics,
            };
            output(&out, json_mode);
        }

        StatsCommands::Refresh { id } => {
            let refreshed = match id {
                Some(id) => {
                    let id = resolve_activity_id(&engine, &id).await?;
                    engine.activities().get(id).await?;
                    engine.statistics().recompute(id, now).await?;
                    1
                }
                None => engine.statistics().refresh_all(now).await?,
            };
            output(&RefreshOutput { refreshed }, json_mode);
        }
    }

    Ok(())
}
