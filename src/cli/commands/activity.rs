//! Activity CLI commands: definition management and lifecycle transitions.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};

use crate::cli::commands::{open_engine, parse_time, resolve_activity_id};
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::domain::models::{
    Activity, ActivityKind, ActivityLog, ActivityStatus, Config, Participation, RepeatPattern, RewardRule,
    TargetRule, TriggerKind, TriggerRule,
};
use crate::domain::ports::{ActivityFilter, ActivityLogFilter};
use crate::services::{ActivityEngine, ActivityUpdate};

#[derive(Args, Debug)]
pub struct ActivityArgs {
    #[command(subcommand)]
    pub command: ActivityCommands,
}

#[derive(Subcommand, Debug)]
pub enum ActivityCommands {
    /// Create a draft activity
    Create {
        /// Display name
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Category (daily_check_in, letter_challenge, streak, milestone, scheduled_drop, custom)
        #[arg(long, default_value = "custom")]
        kind: String,

        /// Trigger (login, letter_written, consecutive_days, cumulative_count, scheduled)
        #[arg(long)]
        trigger: String,

        /// Threshold for consecutive_days and cumulative_count triggers
        #[arg(long)]
        required: Option<u32>,

        /// Target (all, new_users, level:N, school:A,B, custom)
        #[arg(long, default_value = "all")]
        target: String,

        /// Base credits per reward
        #[arg(long)]
        credits: i64,

        #[arg(long)]
        multiplier: Option<f64>,

        /// Scale the reward by progress / 100
        #[arg(long)]
        progress_based: bool,

        /// Total credits the activity may disburse
        #[arg(long)]
        budget: Option<i64>,

        #[arg(long)]
        max_participants: Option<u32>,

        /// 1 (default): one reward; 0: unlimited; n: up to n rewards
        #[arg(long)]
        max_rewards_per_user: Option<u32>,

        /// Start time (RFC3339)
        #[arg(long)]
        start: String,

        /// End time (RFC3339)
        #[arg(long)]
        end: String,

        /// Recurrence (none, daily, weekly, monthly, <N>h)
        #[arg(long, default_value = "none")]
        repeat: String,

        /// Last recurrence time (RFC3339)
        #[arg(long)]
        repeat_until: Option<String>,

        #[arg(long, default_value_t = 0)]
        priority: i32,

        /// Admin creating the activity
        #[arg(long)]
        created_by: Option<String>,
    },

    /// Update an activity in draft, pending or paused state
    Update {
        /// Activity ID or prefix
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        kind: Option<String>,

        #[arg(long)]
        trigger: Option<String>,

        #[arg(long)]
        required: Option<u32>,

        #[arg(long)]
        target: Option<String>,

        #[arg(long)]
        credits: Option<i64>,

        #[arg(long)]
        multiplier: Option<f64>,

        #[arg(long)]
        progress_based: Option<bool>,

        #[arg(long, conflicts_with = "clear_budget")]
        budget: Option<i64>,

        /// Remove the budget cap
        #[arg(long)]
        clear_budget: bool,

        #[arg(long)]
        max_participants: Option<u32>,

        #[arg(long)]
        max_rewards_per_user: Option<u32>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        repeat: Option<String>,

        #[arg(long)]
        repeat_until: Option<String>,

        #[arg(long)]
        priority: Option<i32>,

        /// Fail if the activity was modified since this version
        #[arg(long)]
        expected_version: Option<u64>,
    },

    /// Show an activity
    Show {
        /// Activity ID or prefix
        id: String,
    },

    /// List activities
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,

        /// Filter by trigger kind
        #[arg(long)]
        trigger: Option<String>,

        /// Include soft-deleted activities
        #[arg(long)]
        include_deleted: bool,
    },

    /// Move a draft to pending and create its first schedule
    Publish { id: String },

    /// Start a pending activity
    Start { id: String },

    /// Pause an active activity
    Pause { id: String },

    /// Resume a paused activity
    Resume { id: String },

    /// Complete an activity
    Complete { id: String },

    /// Cancel an activity
    Cancel { id: String },

    /// Soft-delete an activity
    Delete { id: String },

    /// Show the activity log
    History {
        id: String,

        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// List participations of an activity
    Participants { id: String },
}

// -- Output structs --

#[derive(Debug, serde::Serialize)]
pub struct ActivityOutput {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub status: String,
    pub trigger: String,
    pub target: String,
    pub base_credits: i64,
    pub budget: Option<i64>,
    pub consumed_budget: i64,
    pub start_time: String,
    pub end_time: String,
    pub repeat: String,
    pub priority: i32,
    pub version: u64,
}

impl ActivityOutput {
    fn budget_display(&self) -> String {
        match self.budget {
            Some(budget) => format!("{}/{}", self.consumed_budget, budget),
            None => format!("{}/-", self.consumed_budget),
        }
    }
}

impl From<&Activity> for ActivityOutput {
    fn from(a: &Activity) -> Self {
        Self {
            id: a.id.to_string(),
            name: a.name.clone(),
            kind: a.kind.as_str().to_string(),
            status: a.status.as_str().to_string(),
            trigger: a.trigger_rule.description(),
            target: a.target_rule.description(),
            base_credits: a.reward_rule.base_credits,
            budget: a.budget,
            consumed_budget: a.consumed_budget,
            start_time: a.start_time.to_rfc3339(),
            end_time: a.end_time.to_rfc3339(),
            repeat: a.repeat_pattern.description(),
            priority: a.priority,
            version: a.version,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ActivityListOutput {
    pub activities: Vec<ActivityOutput>,
    pub total: usize,
}

impl CommandOutput for ActivityListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "status", "trigger", "budget", "start", "end", "prio"]);
        for a in &self.activities {
            table.add_row(vec![
                short_id(&a.id).to_string(),
                truncate(&a.name, 24),
                a.status.clone(),
                truncate(&a.trigger, 22),
                a.budget_display(),
                a.start_time.clone(),
                a.end_time.clone(),
                a.priority.to_string(),
            ]);
        }
        render_list("activity", table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ActivityDetailOutput {
    #[serde(flatten)]
    pub activity: ActivityOutput,
    pub description: String,
    pub reward_rule: RewardRule,
    pub max_participants: Option<u32>,
    pub max_rewards_per_user: Option<u32>,
    pub repeat_end_date: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Activity> for ActivityDetailOutput {
    fn from(a: &Activity) -> Self {
        Self {
            activity: ActivityOutput::from(a),
            description: a.description.clone(),
            reward_rule: a.reward_rule.clone(),
            max_participants: a.max_participants,
            max_rewards_per_user: a.max_rewards_per_user,
            repeat_end_date: a.repeat_end_date.map(|t| t.to_rfc3339()),
            created_by: a.created_by.clone(),
            created_at: a.created_at.to_rfc3339(),
            updated_at: a.updated_at.to_rfc3339(),
        }
    }
}

impl CommandOutput for ActivityDetailOutput {
    fn to_human(&self) -> String {
        let a = &self.activity;
        let mut lines = vec![
            format!("Activity: {}", a.name),
            format!("ID: {}", a.id),
            format!("Kind: {}", a.kind),
            format!("Status: {}", a.status),
            format!("Version: {}", a.version),
        ];
        if !self.description.is_empty() {
            lines.push(format!("Description: {}", truncate(&self.description, 80)));
        }

        lines.push(String::new());
        lines.push("Rules:".to_string());
        lines.push(format!("  Target: {}", a.target));
        lines.push(format!("  Trigger: {}", a.trigger));
        let mut reward = format!("  Reward: {} credits", self.reward_rule.base_credits);
        if let Some(m) = self.reward_rule.multiplier {
            reward.push_str(&format!(" x{m}"));
        }
        if self.reward_rule.progress_based {
            reward.push_str(" (progress based)");
        }
        lines.push(reward);

        lines.push(String::new());
        lines.push("Limits:".to_string());
        lines.push(format!("  Budget: {}", a.budget_display()));
        if let Some(max) = self.max_participants {
            lines.push(format!("  Max participants: {}", max));
        }
        let per_user = match self.max_rewards_per_user {
            None | Some(1) => "1".to_string(),
            Some(0) => "unlimited".to_string(),
            Some(n) => n.to_string(),
        };
        lines.push(format!("  Rewards per user: {}", per_user));

        lines.push(String::new());
        lines.push(format!("Window: {} .. {}", a.start_time, a.end_time));
        lines.push(format!("Repeat: {}", a.repeat));
        if let Some(ref until) = self.repeat_end_date {
            lines.push(format!("Repeat until: {}", until));
        }
        lines.push(format!("Priority: {}", a.priority));
        if let Some(ref by) = self.created_by {
            lines.push(format!("Created by: {}", by));
        }
        lines.push(format!("Created: {}", self.created_at));
        lines.push(format!("Updated: {}", self.updated_at));
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ActivityActionOutput {
    pub success: bool,
    pub message: String,
    pub activity_id: String,
    pub status: Option<String>,
}

impl CommandOutput for ActivityActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HistoryOutput {
    pub entries: Vec<ActivityLog>,
    pub total: usize,
}

impl CommandOutput for HistoryOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["time", "action", "user", "details"]);
        for entry in &self.entries {
            table.add_row(vec![
                entry.created_at.to_rfc3339(),
                entry.action.as_str().to_string(),
                entry.user_id.clone().unwrap_or_else(|| "-".to_string()),
                truncate(&entry.details.to_string(), 60),
            ]);
        }
        render_list("log entry", table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ParticipantsOutput {
    pub participations: Vec<Participation>,
    pub total: usize,
}

impl CommandOutput for ParticipantsOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["user", "progress", "credits", "joined", "completed"]);
        for p in &self.participations {
            table.add_row(vec![
                truncate(&p.user_id, 20),
                p.progress.to_string(),
                p.reward_credits.to_string(),
                p.participated_at.to_rfc3339(),
                p.completed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }
        render_list("participation", table, self.total)
    }
}

// -- Argument parsing --

/// Build a trigger rule from its kind name and optional threshold.
pub fn parse_trigger(kind: &str, required: Option<u32>) -> Result<TriggerRule> {
    let kind = TriggerKind::from_str(kind).with_context(|| format!("Unknown trigger '{kind}'"))?;
    let threshold = || required.with_context(|| format!("Trigger '{kind}' needs --required"));
    Ok(match kind {
        TriggerKind::Login => TriggerRule::Login,
        TriggerKind::LetterWritten => TriggerRule::LetterWritten,
        TriggerKind::ConsecutiveDays => TriggerRule::ConsecutiveDays { required: threshold()? },
        TriggerKind::CumulativeCount => TriggerRule::CumulativeCount { required: threshold()? },
        TriggerKind::Scheduled => TriggerRule::Scheduled,
    })
}

/// Parse `all`, `new_users`, `level:N`, `school:A,B` or `custom`.
pub fn parse_target(value: &str) -> Result<TargetRule> {
    let (head, arg) = match value.split_once(':') {
        Some((head, arg)) => (head.trim().to_lowercase(), Some(arg.trim())),
        None => (value.trim().to_lowercase(), None),
    };
    match (head.as_str(), arg) {
        ("all", None) => Ok(TargetRule::All),
        ("new_users" | "new", None) => Ok(TargetRule::NewUsers),
        ("custom", None) => Ok(TargetRule::Custom),
        ("level", Some(n)) => Ok(TargetRule::ByLevel {
            min_level: n.parse().with_context(|| format!("Invalid level '{n}'"))?,
        }),
        ("school", Some(codes)) => Ok(TargetRule::BySchool {
            school_codes: codes
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
        }),
        _ => anyhow::bail!("Unknown target '{value}'. Use all, new_users, level:N, school:A,B or custom"),
    }
}

fn parse_repeat(value: &str) -> Result<RepeatPattern> {
    RepeatPattern::from_str(value)
        .with_context(|| format!("Unknown repeat pattern '{value}'. Use none, daily, weekly, monthly or <N>h"))
}

fn parse_kind(value: &str) -> Result<ActivityKind> {
    ActivityKind::from_str(value).with_context(|| format!("Unknown activity kind '{value}'"))
}

// -- Execute --

pub async fn execute(args: ActivityArgs, config: &Config, json_mode: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let service = engine.activities();
    let now = Utc::now();

    match args.command {
        ActivityCommands::Create {
            name,
            description,
            kind,
            trigger,
            required,
            target,
            credits,
            multiplier,
            progress_based,
            budget,
            max_participants,
            max_rewards_per_user,
            start,
            end,
            repeat,
            repeat_until,
            priority,
            created_by,
        } => {
            let mut reward = RewardRule::fixed(credits);
            reward.multiplier = multiplier;
            reward.progress_based = progress_based;

            let mut activity = Activity::new(
                name,
                parse_trigger(&trigger, required)?,
                reward,
                parse_time(&start)?,
                parse_time(&end)?,
            )
            .with_description(description)
            .with_kind(parse_kind(&kind)?)
            .with_target(parse_target(&target)?)
            .with_repeat(
                parse_repeat(&repeat)?,
                repeat_until.as_deref().map(parse_time).transpose()?,
            )
            .with_priority(priority);
            activity.budget = budget;
            activity.max_participants = max_participants;
            activity.max_rewards_per_user = max_rewards_per_user;
            activity.created_by = created_by;

            let activity = service.create(activity, now).await?;
            let out = ActivityActionOutput {
                success: true,
                message: format!("Created activity '{}'\nID: {}", activity.name, activity.id),
                activity_id: activity.id.to_string(),
                status: Some(activity.status.as_str().to_string()),
            };
            output(&out, json_mode);
        }

        ActivityCommands::Update {
            id,
            name,
            description,
            kind,
            trigger,
            required,
            target,
            credits,
            multiplier,
            progress_based,
            budget,
            clear_budget,
            max_participants,
            max_rewards_per_user,
            start,
            end,
            repeat,
            repeat_until,
            priority,
            expected_version,
        } => {
            let id = resolve_activity_id(&engine, &id).await?;
            let current = service.get(id).await?;

            let trigger_rule = match (trigger, required) {
                (Some(kind), required) => Some(parse_trigger(&kind, required)?),
                (None, Some(required)) => Some(parse_trigger(current.trigger_kind().as_str(), Some(required))?),
                (None, None) => None,
            };
            let reward_rule = if credits.is_some() || multiplier.is_some() || progress_based.is_some() {
                let mut rule = current.reward_rule.clone();
                if let Some(credits) = credits {
                    rule.base_credits = credits;
                }
                if multiplier.is_some() {
                    rule.multiplier = multiplier;
                }
                if let Some(progress_based) = progress_based {
                    rule.progress_based = progress_based;
                }
                Some(rule)
            } else {
                None
            };

            let update = ActivityUpdate {
                name,
                description,
                kind: kind.as_deref().map(parse_kind).transpose()?,
                target_rule: target.as_deref().map(parse_target).transpose()?,
                trigger_rule,
                reward_rule,
                budget: if clear_budget { Some(None) } else { budget.map(Some) },
                max_participants: max_participants.map(Some),
                max_rewards_per_user: max_rewards_per_user.map(Some),
                start_time: start.as_deref().map(parse_time).transpose()?,
                end_time: end.as_deref().map(parse_time).transpose()?,
                repeat_pattern: repeat.as_deref().map(parse_repeat).transpose()?,
                repeat_end_date: repeat_until.as_deref().map(parse_time).transpose()?.map(Some),
                priority,
                expected_version,
            };

            let activity = service.update(id, update, now).await?;
            let out = ActivityActionOutput {
                success: true,
                message: format!("Updated activity '{}' (version {})", activity.name, activity.version),
                activity_id: activity.id.to_string(),
                status: Some(activity.status.as_str().to_string()),
            };
            output(&out, json_mode);
        }

        ActivityCommands::Show { id } => {
            let id = resolve_activity_id(&engine, &id).await?;
            let activity = service.get(id).await?;
            output(&ActivityDetailOutput::from(&activity), json_mode);
        }

        ActivityCommands::List {
            status,
            trigger,
            include_deleted,
        } => {
            let filter = ActivityFilter {
                status: status
                    .as_deref()
                    .map(|s| ActivityStatus::from_str(s).with_context(|| format!("Unknown status '{s}'")))
                    .transpose()?,
                trigger_kind: trigger
                    .as_deref()
                    .map(|t| TriggerKind::from_str(t).with_context(|| format!("Unknown trigger '{t}'")))
                    .transpose()?,
                include_deleted,
            };
            let activities = service.list(filter).await?;
            let out = ActivityListOutput {
                total: activities.len(),
                activities: activities.iter().map(ActivityOutput::from).collect(),
            };
            output(&out, json_mode);
        }

        ActivityCommands::Publish { id } => {
            transition(&engine, &id, "published", json_mode, |id| service.publish(id, now)).await?;
        }
        ActivityCommands::Start { id } => {
            transition(&engine, &id, "started", json_mode, |id| service.start(id, now)).await?;
        }
        ActivityCommands::Pause { id } => {
            transition(&engine, &id, "paused", json_mode, |id| service.pause(id, now)).await?;
        }
        ActivityCommands::Resume { id } => {
            transition(&engine, &id, "resumed", json_mode, |id| service.resume(id, now)).await?;
        }
        ActivityCommands::Complete { id } => {
            transition(&engine, &id, "completed", json_mode, |id| service.complete(id, now)).await?;
        }
        ActivityCommands::Cancel { id } => {
            transition(&engine, &id, "cancelled", json_mode, |id| service.cancel(id, now)).await?;
        }

        ActivityCommands::Delete { id } => {
            let id = resolve_activity_id(&engine, &id).await?;
            service.delete(id, now).await?;
            let out = ActivityActionOutput {
                success: true,
                message: format!("Activity deleted: {}", id),
                activity_id: id.to_string(),
                status: None,
            };
            output(&out, json_mode);
        }

        ActivityCommands::History { id, limit } => {
            let id = resolve_activity_id(&engine, &id).await?;
            let entries = engine
                .logs()
                .list(ActivityLogFilter {
                    activity_id: Some(id),
                    limit: Some(limit),
                    ..Default::default()
                })
                .await?;
            let out = HistoryOutput {
                total: entries.len(),
                entries,
            };
            output(&out, json_mode);
        }

        ActivityCommands::Participants { id } => {
            let id = resolve_activity_id(&engine, &id).await?;
            let participations = engine.participations().list_for_activity(id).await?;
            let out = ParticipantsOutput {
                total: participations.len(),
                participations,
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}

async fn transition<F, Fut>(
    engine: &ActivityEngine,
    id_or_prefix: &str,
    verb: &str,
    json_mode: bool,
    op: F,
) -> Result<()>
where
    F: FnOnce(uuid::Uuid) -> Fut,
    Fut: std::future::Future<Output = crate::domain::errors::DomainResult<Activity>>,
{
    let id = resolve_activity_id(engine, id_or_prefix).await?;
    let activity = op(id).await?;
    let out = ActivityActionOutput {
        success: true,
        message: format!("Activity {}: {} ({})", verb, activity.name, activity.status),
        activity_id: activity.id.to_string(),
        status: Some(activity.status.as_str().to_string()),
    };
    output(&out, json_mode);
    Ok(())
}
