//! End-to-end participation scenarios through the engine facade.

mod common;

use activity_engine::domain::models::{
    ActivityAction, EventPayload, ParticipationOutcome, ParticipationRejection, TargetRule, TriggerKind, TriggerRule,
    UserProfile,
};
use activity_engine::domain::ports::ActivityLogFilter;
use activity_engine::DomainError;
use chrono::Duration;
use common::{engine, launch, login_activity, seasoned_users, t0};
use serde_json::json;

fn during() -> chrono::DateTime<chrono::Utc> {
    t0() + Duration::hours(2)
}

#[tokio::test]
async fn budget_refuses_the_reward_that_would_overrun_it() {
    let te = engine(seasoned_users(3)).await;
    let activity = launch(&te.engine, login_activity(10).with_budget(25)).await;

    let mut outcomes = Vec::new();
    for user in ["u-1", "u-2", "u-3"] {
        outcomes.push(
            te.engine
                .participation()
                .participate(activity.id, user, EventPayload::new(), during())
                .await
                .unwrap(),
        );
    }

    assert_eq!(outcomes[0], ParticipationOutcome::Rewarded { credits: 10, progress: 1 });
    assert_eq!(outcomes[1], ParticipationOutcome::Rewarded { credits: 10, progress: 1 });
    assert_eq!(outcomes[2], ParticipationOutcome::BudgetExhausted { progress: 1 });

    let stored = te.engine.activities().get(activity.id).await.unwrap();
    assert_eq!(stored.consumed_budget, 20);

    let third = te.engine.participations().get(activity.id, "u-3").await.unwrap().unwrap();
    assert_eq!(third.progress, 1);
    assert_eq!(third.reward_credits, 0);

    assert_eq!(te.ledger.balance("u-1").await, 10);
    assert_eq!(te.ledger.balance("u-2").await, 10);
    assert_eq!(te.ledger.balance("u-3").await, 0);
}

#[tokio::test]
async fn single_reward_per_user_is_enforced() {
    let te = engine(seasoned_users(1)).await;
    let activity = launch(&te.engine, login_activity(10).with_max_rewards_per_user(1)).await;
    let participation = te.engine.participation();

    let first = participation
        .participate(activity.id, "u-1", EventPayload::new(), during())
        .await
        .unwrap();
    let second = participation
        .participate(activity.id, "u-1", EventPayload::new(), during() + Duration::minutes(5))
        .await
        .unwrap();

    assert!(first.is_rewarded());
    assert_eq!(
        second,
        ParticipationOutcome::rejected(ParticipationRejection::MaxParticipationReached)
    );
    assert_eq!(te.ledger.grants().await.len(), 1);

    let row = te.engine.participations().get(activity.id, "u-1").await.unwrap().unwrap();
    assert_eq!(row.progress, 1);
    assert_eq!(row.reward_credits, 10);
    assert!(row.completed_at.is_some());
}

#[tokio::test]
async fn paused_activity_rejects_without_mutation() {
    let te = engine(seasoned_users(1)).await;
    let activity = launch(&te.engine, login_activity(10).with_budget(100)).await;
    te.engine.activities().pause(activity.id, during()).await.unwrap();
    let logs_before = te
        .engine
        .logs()
        .list(ActivityLogFilter {
            activity_id: Some(activity.id),
            ..Default::default()
        })
        .await
        .unwrap()
        .len();

    let outcome = te
        .engine
        .participation()
        .participate(activity.id, "u-1", EventPayload::new(), during())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ParticipationOutcome::rejected(ParticipationRejection::ActivityNotActive)
    );
    assert!(te.engine.participations().get(activity.id, "u-1").await.unwrap().is_none());
    assert_eq!(te.engine.activities().get(activity.id).await.unwrap().consumed_budget, 0);
    let logs_after = te
        .engine
        .logs()
        .list(ActivityLogFilter {
            activity_id: Some(activity.id),
            ..Default::default()
        })
        .await
        .unwrap()
        .len();
    assert_eq!(logs_before, logs_after);
    assert_eq!(te.ledger.attempts().await, 0);
}

#[tokio::test]
async fn ineligible_users_are_turned_away() {
    let users = vec![
        UserProfile::new("junior", t0() - Duration::days(400)).with_level(1),
        UserProfile::new("senior", t0() - Duration::days(400)).with_level(5),
    ];
    let te = engine(users).await;
    let activity = launch(
        &te.engine,
        login_activity(20).with_target(TargetRule::ByLevel { min_level: 3 }),
    )
    .await;

    let junior = te
        .engine
        .participation()
        .participate(activity.id, "junior", EventPayload::new(), during())
        .await
        .unwrap();
    let senior = te
        .engine
        .participation()
        .participate(activity.id, "senior", EventPayload::new(), during())
        .await
        .unwrap();

    assert_eq!(junior, ParticipationOutcome::rejected(ParticipationRejection::NotEligible));
    assert_eq!(senior, ParticipationOutcome::Rewarded { credits: 20, progress: 1 });
}

#[tokio::test]
async fn unknown_user_and_activity_are_errors() {
    let te = engine(seasoned_users(1)).await;
    let activity = launch(&te.engine, login_activity(10)).await;

    let err = te
        .engine
        .participation()
        .participate(activity.id, "ghost", EventPayload::new(), during())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::UserNotFound(ref id) if id == "ghost"));

    let missing = uuid::Uuid::new_v4();
    let err = te
        .engine
        .participation()
        .participate(missing, "u-1", EventPayload::new(), during())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ActivityNotFound(id) if id == missing));
}

#[tokio::test]
async fn cumulative_trigger_rewards_on_threshold() {
    let te = engine(seasoned_users(1)).await;
    let mut activity = login_activity(30);
    activity.trigger_rule = TriggerRule::CumulativeCount { required: 3 };
    let activity = launch(&te.engine, activity).await;

    let mut outcomes = Vec::new();
    for i in 0..3 {
        let mut payload = EventPayload::new();
        payload.insert("cumulative_count".to_string(), json!(i + 1));
        outcomes.push(
            te.engine
                .participation()
                .participate(activity.id, "u-1", payload, during() + Duration::minutes(i))
                .await
                .unwrap(),
        );
    }

    assert_eq!(outcomes[0], ParticipationOutcome::Progressed { progress: 1 });
    assert_eq!(outcomes[1], ParticipationOutcome::Progressed { progress: 2 });
    assert_eq!(outcomes[2], ParticipationOutcome::Rewarded { credits: 30, progress: 3 });
}

#[tokio::test]
async fn trigger_dispatch_visits_activities_by_priority() {
    let te = engine(seasoned_users(1)).await;
    let low = launch(&te.engine, login_activity(5).with_priority(1)).await;
    let high = launch(&te.engine, login_activity(50).with_priority(10)).await;
    let mut letter = login_activity(7);
    letter.trigger_rule = TriggerRule::LetterWritten;
    launch(&te.engine, letter).await;

    let outcomes = te
        .engine
        .participation()
        .evaluate_activity_trigger("u-1", TriggerKind::Login, EventPayload::new(), during())
        .await
        .unwrap();

    let order: Vec<_> = outcomes.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec![high.id, low.id]);
    assert_eq!(te.ledger.balance("u-1").await, 55);

    let participate_logs = te
        .engine
        .logs()
        .list(ActivityLogFilter {
            user_id: Some("u-1".to_string()),
            action: Some(ActivityAction::Participate),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(participate_logs.len(), 2);
}

#[tokio::test]
async fn scheduled_kind_cannot_be_raised_as_an_event() {
    let te = engine(seasoned_users(1)).await;
    let err = te
        .engine
        .participation()
        .evaluate_activity_trigger("u-1", TriggerKind::Scheduled, EventPayload::new(), during())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ValidationFailed(_)));
}
