//! CLI type definitions
//!
//! Top-level clap structures; each command group lives in `commands`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::{
    activity::ActivityArgs, event::EventArgs, init::InitArgs, rewards::RewardsArgs,
    schedule::ScheduleArgs, stats::StatsArgs,
};

#[derive(Parser, Debug)]
#[command(name = "activity-engine")]
#[command(about = "Activity Engine - reward campaigns, triggers and scheduling", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to `.activity-engine/config.yaml` plus env overrides)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration and database
    Init(InitArgs),

    /// Activity management and lifecycle
    Activity(ActivityArgs),

    /// Feed user events into active activities
    Event(EventArgs),

    /// Inspect and drive the scheduler
    Schedule(ScheduleArgs),

    /// Activity statistics
    Stats(StatsArgs),

    /// Deferred reward reconciliation
    Rewards(RewardsArgs),
}
