//! Event CLI commands: feed user events into the engine.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};

use crate::cli::commands::{open_engine, parse_payload, resolve_activity_id};
use crate::cli::output::{list_table, output, render_list, short_id, CommandOutput};
use crate::domain::models::{Config, ParticipationOutcome, TriggerKind};

#[derive(Args, Debug)]
pub struct EventArgs {
    #[command(subcommand)]
    pub command: EventCommands,
}

#[derive(Subcommand, Debug)]
pub enum EventCommands {
    /// Dispatch an event to every active activity of a trigger kind
    Trigger {
        /// User raising the event
        #[arg(long)]
        user: String,

        /// Trigger kind (login, letter_written, consecutive_days, cumulative_count)
        #[arg(long)]
        kind: String,

        /// Event payload as a JSON object
        #[arg(long)]
        payload: Option<String>,
    },

    /// Record an event against a single activity
    Participate {
        /// Activity ID or prefix
        activity: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        payload: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct OutcomeOutput {
    pub activity_id: String,
    #[serde(flatten)]
    pub outcome: ParticipationOutcome,
}

#[derive(Debug, serde::Serialize)]
pub struct TriggerOutput {
    pub user_id: String,
    pub trigger: String,
    pub outcomes: Vec<OutcomeOutput>,
    pub total_credits: i64,
}

impl CommandOutput for TriggerOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["activity", "outcome"]);
        for o in &self.outcomes {
            table.add_row(vec![short_id(&o.activity_id).to_string(), o.outcome.label()]);
        }
        let mut text = render_list("matching activity", table, self.outcomes.len());
        if self.total_credits > 0 {
            text.push_str(&format!("\nCredits earned: {}", self.total_credits));
        }
        text
    }
}

impl CommandOutput for OutcomeOutput {
    fn to_human(&self) -> String {
        format!("Activity {}: {}", short_id(&self.activity_id), self.outcome.label())
    }
}

pub async fn execute(args: EventArgs, config: &Config, json_mode: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let now = Utc::now();

    match args.command {
        EventCommands::Trigger { user, kind, payload } => {
            let trigger = TriggerKind::from_str(&kind).with_context(|| format!("Unknown trigger '{kind}'"))?;
            let outcomes = engine
                .participation()
                .evaluate_activity_trigger(&user, trigger, parse_payload(payload.as_deref())?, now)
                .await?;

            let out = TriggerOutput {
                user_id: user,
                trigger: trigger.to_string(),
                total_credits: outcomes.iter().map(|(_, o)| o.credits()).sum(),
                outcomes: outcomes
                    .into_iter()
                    .map(|(id, outcome)| OutcomeOutput {
                        activity_id: id.to_string(),
                        outcome,
                    })
                    .collect(),
            };
            output(&out, json_mode);
        }

        EventCommands::Participate {
            activity,
            user,
            payload,
        } => {
            let id = resolve_activity_id(&engine, &activity).await?;
            let outcome = engine
                .participation()
                .participate(id, &user, parse_payload(payload.as_deref())?, now)
                .await?;
            let out = OutcomeOutput {
                activity_id: id.to_string(),
                outcome,
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ParticipationRejection;

    #[test]
    fn test_trigger_output_sums_credits() {
        let out = TriggerOutput {
            user_id: "u1".to_string(),
            trigger: "login".to_string(),
            outcomes: vec![
                OutcomeOutput {
                    activity_id: "aaaaaaaa-0000".to_string(),
                    outcome: ParticipationOutcome::Rewarded { credits: 10, progress: 1 },
                },
                OutcomeOutput {
                    activity_id: "bbbbbbbb-0000".to_string(),
                    outcome: ParticipationOutcome::rejected(ParticipationRejection::NotEligible),
                },
            ],
            total_credits: 10,
        };
        let human = out.to_human();
        assert!(human.contains("rewarded 10"));
        assert!(human.contains("not_eligible"));
        assert!(human.contains("Credits earned: 10"));

        let json = out.to_json();
        assert_eq!(json["outcomes"][0]["outcome"], "rewarded");
        assert_eq!(json["outcomes"][0]["activity_id"], "aaaaaaaa-0000");
    }
}
