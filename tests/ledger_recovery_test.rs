//! Rewards committed while the credit ledger is down, and their reconciliation.

mod common;

use activity_engine::domain::models::{ActivityAction, EngineConfig, EventPayload, ParticipationOutcome};
use activity_engine::domain::ports::ActivityLogFilter;
use activity_engine::Config;
use chrono::Duration;
use common::{engine, engine_with, launch, login_activity, seasoned_users, t0};

#[tokio::test]
async fn outage_defers_reward_but_keeps_budget_and_progress() {
    let te = engine(seasoned_users(1)).await;
    let activity = launch(&te.engine, login_activity(10).with_budget(100)).await;
    te.ledger.set_outage(true).await;

    let now = t0() + Duration::hours(1);
    let outcome = te
        .engine
        .participation()
        .participate(activity.id, "u-1", EventPayload::new(), now)
        .await
        .unwrap();

    let ParticipationOutcome::RewardDeferred {
        credits,
        progress,
        idempotency_key,
    } = outcome
    else {
        panic!("expected a deferred reward, got {outcome:?}");
    };
    assert_eq!((credits, progress), (10, 1));

    assert_eq!(te.engine.activities().get(activity.id).await.unwrap().consumed_budget, 10);
    let row = te.engine.participations().get(activity.id, "u-1").await.unwrap().unwrap();
    assert_eq!(row.progress, 1);
    assert_eq!(row.reward_credits, 10);

    let pending = te
        .engine
        .logs()
        .list(ActivityLogFilter {
            action: Some(ActivityAction::RewardPendingRetry),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].user_id.as_deref(), Some("u-1"));
    assert_eq!(pending[0].details["idempotency_key"], idempotency_key.as_str());
    assert_eq!(te.ledger.balance("u-1").await, 0);
}

#[tokio::test]
async fn reconcile_pays_once_after_recovery() {
    let te = engine(seasoned_users(2)).await;
    let activity = launch(&te.engine, login_activity(10)).await;
    let now = t0() + Duration::hours(1);

    te.ledger.set_outage(true).await;
    for user in ["u-1", "u-2"] {
        te.engine
            .participation()
            .participate(activity.id, user, EventPayload::new(), now)
            .await
            .unwrap();
    }

    let still_down = te.engine.participation().reconcile_pending_rewards(now).await.unwrap();
    assert_eq!(still_down.attempted, 2);
    assert_eq!(still_down.still_pending, 2);

    te.ledger.set_outage(false).await;
    let report = te
        .engine
        .participation()
        .reconcile_pending_rewards(now + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(report.reconciled, 2);
    assert_eq!(te.ledger.balance("u-1").await, 10);
    assert_eq!(te.ledger.balance("u-2").await, 10);

    let again = te
        .engine
        .participation()
        .reconcile_pending_rewards(now + Duration::minutes(20))
        .await
        .unwrap();
    assert_eq!(again.attempted, 0);
    assert_eq!(te.ledger.grants().await.len(), 2);

    let reconciled = te
        .engine
        .logs()
        .list(ActivityLogFilter {
            activity_id: Some(activity.id),
            action: Some(ActivityAction::RewardReconciled),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(reconciled.len(), 2);
}

#[tokio::test]
async fn slow_ledger_times_out_into_a_deferred_reward() {
    let config = Config {
        engine: EngineConfig {
            ledger_timeout_ms: 50,
            ..EngineConfig::default()
        },
        ..Config::default()
    };
    let te = engine_with(config, seasoned_users(1)).await;
    let activity = launch(&te.engine, login_activity(25)).await;
    te.ledger
        .set_latency(Some(std::time::Duration::from_millis(500)))
        .await;

    let now = t0() + Duration::hours(1);
    let outcome = te
        .engine
        .participation()
        .participate(activity.id, "u-1", EventPayload::new(), now)
        .await
        .unwrap();
    assert!(matches!(outcome, ParticipationOutcome::RewardDeferred { credits: 25, .. }));
    assert_eq!(te.ledger.balance("u-1").await, 0);

    te.ledger.set_latency(None).await;
    let report = te.engine.participation().reconcile_pending_rewards(now).await.unwrap();
    assert_eq!(report.reconciled, 1);
    assert_eq!(te.ledger.balance("u-1").await, 25);
}
