//! Participation service.
//!
//! Runs `participate` for live events and scheduler fan-out. Steps that touch
//! the participation row or the budget counter run inside one
//! [`ParticipationUnit`]; the credit ledger is called only after that unit has
//! committed, so a slow or failing ledger never loses recorded progress.

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, LedgerError};
use crate::domain::models::{
    Activity, ActivityAction, ActivityLog, EngineConfig, EventPayload, Participation, ParticipationOutcome,
    ParticipationRejection, PendingReward, RewardCap, TriggerKind, UserProfile,
};
use crate::domain::ports::{
    ActivityLogFilter, ActivityLogRepository, ActivityRepository, CreditLedger, ParticipationRepository,
    ParticipationUnit, UserDirectory,
};
use crate::services::reward_calculator::calculate_reward;
use crate::services::target_evaluator::TargetEvaluator;
use crate::services::trigger_evaluator::{is_triggered, EventOrigin};

/// Attempts for a participation transaction that hits lock contention.
const MAX_SETTLE_ATTEMPTS: u32 = 2;

/// Attempts to record a deferred reward once its budget is committed.
const MAX_DEFER_ATTEMPTS: u32 = 3;

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub attempted: usize,
    pub reconciled: usize,
    pub still_pending: usize,
}

/// What the participation transaction decided.
enum Settlement {
    Done(ParticipationOutcome),
    /// Budget reserved and progress committed; the ledger still has to pay.
    Grant(PendingReward, u32),
}

pub struct ParticipationService {
    activities: Arc<dyn ActivityRepository>,
    participations: Arc<dyn ParticipationRepository>,
    logs: Arc<dyn ActivityLogRepository>,
    ledger: Arc<dyn CreditLedger>,
    users: Arc<dyn UserDirectory>,
    targets: Arc<TargetEvaluator>,
    config: EngineConfig,
}

impl ParticipationService {
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        participations: Arc<dyn ParticipationRepository>,
        logs: Arc<dyn ActivityLogRepository>,
        ledger: Arc<dyn CreditLedger>,
        users: Arc<dyn UserDirectory>,
        targets: Arc<TargetEvaluator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            activities,
            participations,
            logs,
            ledger,
            users,
            targets,
            config,
        }
    }

    /// Record an event for one user against one activity.
    pub async fn participate(
        &self,
        activity_id: Uuid,
        user_id: &str,
        payload: EventPayload,
        now: DateTime<Utc>,
    ) -> DomainResult<ParticipationOutcome> {
        let activity = match self.activities.get(activity_id).await? {
            Some(activity) if !activity.is_deleted() => activity,
            _ => return Err(DomainError::ActivityNotFound(activity_id)),
        };
        if !activity.is_active_at(now) {
            return Ok(ParticipationOutcome::rejected(ParticipationRejection::ActivityNotActive));
        }

        let user = self.fetch_user(user_id).await?;
        self.participate_as(&activity, &user, &payload, EventOrigin::Live, now).await
    }

    /// Scheduler fan-out entry point for a single user.
    pub async fn participate_scheduled(
        &self,
        activity: &Activity,
        user: &UserProfile,
        now: DateTime<Utc>,
    ) -> DomainResult<ParticipationOutcome> {
        let mut payload = EventPayload::new();
        payload.insert("trigger_type".to_string(), json!("scheduled"));
        payload.insert("trigger_time".to_string(), json!(now.to_rfc3339()));
        self.participate_as(activity, user, &payload, EventOrigin::Scheduler, now).await
    }

    /// Dispatch a live event to every active activity listening for `kind`,
    /// highest priority first.
    pub async fn evaluate_activity_trigger(
        &self,
        user_id: &str,
        kind: TriggerKind,
        payload: EventPayload,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<(Uuid, ParticipationOutcome)>> {
        if kind == TriggerKind::Scheduled {
            return Err(DomainError::ValidationFailed(
                "scheduled triggers are raised by the scheduler, not by events".to_string(),
            ));
        }

        let user = self.fetch_user(user_id).await?;
        let candidates = self.activities.list_active_by_trigger(kind, now).await?;
        debug!(user_id, trigger = %kind, candidates = candidates.len(), "evaluating trigger");

        let mut outcomes = Vec::with_capacity(candidates.len());
        for activity in &candidates {
            match self.participate_as(activity, &user, &payload, EventOrigin::Live, now).await {
                Ok(outcome) => outcomes.push((activity.id, outcome)),
                Err(e) => warn!(activity_id = %activity.id, user_id, error = %e, "participation failed"),
            }
        }
        Ok(outcomes)
    }

    /// Re-issue rewards whose disbursement was deferred.
    pub async fn reconcile_pending_rewards(&self, now: DateTime<Utc>) -> DomainResult<ReconcileReport> {
        let pending = self
            .logs
            .list(ActivityLogFilter {
                action: Some(ActivityAction::RewardPendingRetry),
                ..Default::default()
            })
            .await?;
        let mut settled: HashSet<String> = self
            .logs
            .list(ActivityLogFilter {
                action: Some(ActivityAction::RewardReconciled),
                ..Default::default()
            })
            .await?
            .iter()
            .filter_map(|entry| entry.details.get("idempotency_key")?.as_str().map(str::to_string))
            .collect();

        let mut report = ReconcileReport::default();
        for reward in pending.iter().filter_map(PendingReward::from_log) {
            if settled.contains(&reward.idempotency_key) {
                continue;
            }
            report.attempted += 1;

            match self.disburse(&reward).await {
                Ok(()) => {
                    let entry = ActivityLog::new(
                        reward.activity_id,
                        ActivityAction::RewardReconciled,
                        json!({
                            "credits": reward.credits,
                            "idempotency_key": reward.idempotency_key,
                        }),
                    )
                    .for_user(reward.user_id.clone())
                    .at(now);
                    self.logs.append(&entry).await?;
                    info!(
                        activity_id = %reward.activity_id,
                        user_id = %reward.user_id,
                        credits = reward.credits,
                        "deferred reward disbursed"
                    );
                    settled.insert(reward.idempotency_key);
                    report.reconciled += 1;
                }
                Err(e) => {
                    warn!(idempotency_key = %reward.idempotency_key, error = %e, "reward still pending");
                    report.still_pending += 1;
                }
            }
        }
        Ok(report)
    }

    async fn participate_as(
        &self,
        activity: &Activity,
        user: &UserProfile,
        payload: &EventPayload,
        origin: EventOrigin,
        now: DateTime<Utc>,
    ) -> DomainResult<ParticipationOutcome> {
        if !self.targets.is_eligible(activity.id, &activity.target_rule, user, now) {
            return Ok(ParticipationOutcome::rejected(ParticipationRejection::NotEligible));
        }

        match self.settle_with_retry(activity.id, user, payload, origin, now).await? {
            Settlement::Done(outcome) => Ok(outcome),
            Settlement::Grant(reward, progress) => self.pay(reward, progress, now).await,
        }
    }

    /// Run the participation transaction, retrying once on lock contention.
    async fn settle_with_retry(
        &self,
        activity_id: Uuid,
        user: &UserProfile,
        payload: &EventPayload,
        origin: EventOrigin,
        now: DateTime<Utc>,
    ) -> DomainResult<Settlement> {
        let mut attempt = 0u32;
        backoff::future::retry(self.retry_policy(), || {
            attempt += 1;
            let final_attempt = attempt >= MAX_SETTLE_ATTEMPTS;
            async move {
                self.settle(activity_id, user, payload, origin, now)
                    .await
                    .map_err(|e| {
                        if e.is_transient() && !final_attempt {
                            debug!(%activity_id, user_id = %user.id, error = %e, "retrying participation");
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
            }
        })
        .await
        .map_err(|e| {
            if e.is_transient() {
                DomainError::Internal(format!("participation transaction did not go through: {e}"))
            } else {
                e
            }
        })
    }

    fn retry_policy(&self) -> ExponentialBackoff {
        let backoff_ms = self.config.transaction_retry_backoff_ms.max(1);
        ExponentialBackoffBuilder::new()
            .with_initial_interval(StdDuration::from_millis(backoff_ms))
            .with_max_elapsed_time(Some(StdDuration::from_millis(backoff_ms.saturating_mul(10))))
            .build()
    }

    async fn settle(
        &self,
        activity_id: Uuid,
        user: &UserProfile,
        payload: &EventPayload,
        origin: EventOrigin,
        now: DateTime<Utc>,
    ) -> DomainResult<Settlement> {
        let mut unit = self.participations.begin(activity_id, &user.id).await?;

        let activity = unit
            .activity()
            .await?
            .ok_or(DomainError::ActivityNotFound(activity_id))?;
        if !activity.is_active_at(now) {
            return Ok(Settlement::Done(ParticipationOutcome::rejected(
                ParticipationRejection::ActivityNotActive,
            )));
        }

        let mut participation = match unit.participation().await? {
            None => {
                if let Some(max) = activity.max_participants {
                    if unit.participant_count().await? >= u64::from(max) {
                        return Ok(Settlement::Done(ParticipationOutcome::rejected(
                            ParticipationRejection::ActivityFull,
                        )));
                    }
                }
                Participation::new(activity.id, user.id.clone(), now)
            }
            Some(existing) => {
                if let Some(rejection) = repeat_rejection(&activity, &existing) {
                    return Ok(Settlement::Done(ParticipationOutcome::rejected(rejection)));
                }
                existing
            }
        };

        participation.record_event(payload, now);
        let progress = participation.progress;

        if !is_triggered(&activity.trigger_rule, &participation.progress_details, origin) {
            let outcome = ParticipationOutcome::Progressed { progress };
            record_participation(unit, &participation, &outcome, now).await?;
            return Ok(Settlement::Done(outcome));
        }

        let credits = calculate_reward(&activity.reward_rule, progress);
        if credits > 0 && !unit.try_consume_budget(credits).await? {
            info!(activity_id = %activity.id, user_id = %user.id, credits, "budget exhausted");
            let outcome = ParticipationOutcome::BudgetExhausted { progress };
            record_participation(unit, &participation, &outcome, now).await?;
            return Ok(Settlement::Done(outcome));
        }

        let granted = participation.rewards_granted.saturating_add(1);
        let complete = match activity.reward_cap() {
            RewardCap::Single => true,
            RewardCap::Bounded(n) => granted >= n,
            RewardCap::Unlimited => false,
        };
        participation.grant(credits, complete, now);

        let outcome = ParticipationOutcome::Rewarded { credits, progress };
        record_participation(unit, &participation, &outcome, now).await?;

        if credits == 0 {
            return Ok(Settlement::Done(outcome));
        }
        Ok(Settlement::Grant(
            PendingReward {
                activity_id: activity.id,
                user_id: user.id.clone(),
                credits,
                reason: activity.name.clone(),
                idempotency_key: participation.idempotency_key(),
            },
            progress,
        ))
    }

    /// Call the ledger for a committed reward; on failure flag it for retry.
    async fn pay(&self, reward: PendingReward, progress: u32, now: DateTime<Utc>) -> DomainResult<ParticipationOutcome> {
        match self.disburse(&reward).await {
            Ok(()) => {
                info!(
                    activity_id = %reward.activity_id,
                    user_id = %reward.user_id,
                    credits = reward.credits,
                    "reward granted"
                );
                Ok(ParticipationOutcome::Rewarded {
                    credits: reward.credits,
                    progress,
                })
            }
            Err(e) => {
                warn!(
                    activity_id = %reward.activity_id,
                    user_id = %reward.user_id,
                    credits = reward.credits,
                    error = %e,
                    "reward disbursement deferred"
                );
                let entry = ActivityLog::new(
                    reward.activity_id,
                    ActivityAction::RewardPendingRetry,
                    json!({
                        "credits": reward.credits,
                        "reason": reward.reason,
                        "idempotency_key": reward.idempotency_key,
                        "error": e.to_string(),
                    }),
                )
                .for_user(reward.user_id.clone())
                .at(now);
                self.record_deferred(&entry, &reward).await?;

                Ok(ParticipationOutcome::RewardDeferred {
                    credits: reward.credits,
                    progress,
                    idempotency_key: reward.idempotency_key,
                })
            }
        }
    }

    /// Append the `reward_pending_retry` entry. Budget and progress are
    /// already committed, so the entry is the only trace reconciliation has.
    async fn record_deferred(&self, entry: &ActivityLog, reward: &PendingReward) -> DomainResult<()> {
        let mut attempt = 0u32;
        let result = backoff::future::retry(self.retry_policy(), || {
            attempt += 1;
            let final_attempt = attempt >= MAX_DEFER_ATTEMPTS;
            async move {
                self.logs.append(entry).await.map_err(|e| {
                    if final_attempt {
                        backoff::Error::permanent(e)
                    } else {
                        debug!(idempotency_key = %reward.idempotency_key, error = %e, "retrying deferred reward entry");
                        backoff::Error::transient(e)
                    }
                })
            }
        })
        .await;

        if let Err(ref e) = result {
            error!(
                activity_id = %reward.activity_id,
                user_id = %reward.user_id,
                credits = reward.credits,
                idempotency_key = %reward.idempotency_key,
                error = %e,
                "deferred reward could not be recorded"
            );
        }
        result
    }

    async fn disburse(&self, reward: &PendingReward) -> Result<(), LedgerError> {
        let timeout_ms = self.config.ledger_timeout_ms;
        let call = self
            .ledger
            .add_credits(&reward.user_id, reward.credits, &reward.reason, &reward.idempotency_key);
        match tokio::time::timeout(StdDuration::from_millis(timeout_ms), call).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(timeout_ms)),
        }
    }

    async fn fetch_user(&self, user_id: &str) -> DomainResult<UserProfile> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(user_id.to_string()))
    }
}

/// Why an existing participation may not take another event, if it may not.
fn repeat_rejection(activity: &Activity, existing: &Participation) -> Option<ParticipationRejection> {
    if let Some(max) = activity.max_rewards_per_user {
        if max > 0 && existing.rewards_granted >= max {
            return Some(ParticipationRejection::MaxParticipationReached);
        }
    }
    existing
        .is_completed()
        .then_some(ParticipationRejection::AlreadyCompleted)
}

/// Persist the participation with its log entry and commit the unit.
async fn record_participation(
    mut unit: Box<dyn ParticipationUnit>,
    participation: &Participation,
    outcome: &ParticipationOutcome,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    unit.save_participation(participation).await?;

    let mut details = serde_json::to_value(outcome)?;
    if let Some(map) = details.as_object_mut() {
        map.insert("event".to_string(), serde_json::Value::Object(participation.progress_details.clone()));
        if outcome.is_rewarded() {
            map.insert("idempotency_key".to_string(), json!(participation.idempotency_key()));
        }
    }
    let entry = ActivityLog::new(participation.activity_id, ActivityAction::Participate, details)
        .for_user(participation.user_id.clone())
        .at(now);
    unit.append_log(&entry).await?;

    unit.commit().await
}
