//! Scheduler ticks against a real store: recurrence, fan-out, recovery, expiry.

mod common;

use activity_engine::domain::models::{
    Activity, ActivityStatus, RepeatPattern, RewardRule, ScheduleStatus, TargetRule, TriggerRule, UserProfile,
};
use activity_engine::domain::ports::ScheduleFilter;
use activity_engine::services::{SchedulerEvent, StopReason};
use chrono::{DateTime, Duration, Utc};
use common::{at, engine, seasoned_users, t0, TestEngine};
use uuid::Uuid;

fn scheduled(credits: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Activity {
    Activity::new("Morning drop", TriggerRule::Scheduled, RewardRule::fixed(credits), start, end)
}

/// Create and publish; the scheduler is left to start it.
async fn publish(te: &TestEngine, activity: Activity, now: DateTime<Utc>) -> Uuid {
    let id = te.engine.activities().create(activity, now).await.unwrap().id;
    te.engine.activities().publish(id, now).await.unwrap();
    id
}

async fn schedules_of(te: &TestEngine, id: Uuid) -> Vec<activity_engine::domain::models::ActivitySchedule> {
    let mut schedules = te
        .engine
        .schedules()
        .list(ScheduleFilter {
            activity_id: Some(id),
            status: None,
        })
        .await
        .unwrap();
    schedules.sort_by_key(|s| s.scheduled_time);
    schedules
}

#[tokio::test]
async fn daily_recurrence_keeps_its_anchor_across_irregular_ticks() {
    let te = engine(seasoned_users(1)).await;
    let activity = scheduled(5, at(2026, 3, 2, 9, 0), at(2026, 3, 10, 9, 0))
        .with_repeat(RepeatPattern::Daily, Some(at(2026, 3, 8, 12, 0)))
        .with_max_rewards_per_user(0);
    let id = publish(&te, activity, t0()).await;

    let ticks = [
        at(2026, 3, 2, 9, 0) + Duration::seconds(30),
        at(2026, 3, 3, 18, 0),
        at(2026, 3, 4, 9, 1),
        at(2026, 3, 5, 23, 59),
        at(2026, 3, 7, 10, 0),
        at(2026, 3, 7, 10, 5),
        at(2026, 3, 8, 15, 0),
        at(2026, 3, 9, 9, 30),
    ];
    for now in ticks {
        te.engine.scheduler().tick(now).await.unwrap();
    }

    let schedules = schedules_of(&te, id).await;
    let times: Vec<_> = schedules.iter().map(|s| s.scheduled_time).collect();
    let expected: Vec<_> = (2..=8).map(|day| at(2026, 3, day, 9, 0)).collect();
    assert_eq!(times, expected);
    assert!(schedules.iter().all(|s| s.status == ScheduleStatus::Completed));

    let participation = te.engine.participations().get(id, "u-1").await.unwrap().unwrap();
    assert_eq!(participation.progress, 7);
    assert_eq!(te.ledger.balance("u-1").await, 35);
    assert_eq!(te.engine.activities().get(id).await.unwrap().status, ActivityStatus::Active);
}

#[tokio::test]
async fn a_tick_executes_each_occurrence_once() {
    let te = engine(seasoned_users(2)).await;
    let start = t0() + Duration::hours(1);
    let id = publish(&te, scheduled(10, start, start + Duration::days(3)), t0()).await;

    let first = te.engine.scheduler().tick(start + Duration::minutes(1)).await.unwrap();
    assert_eq!(first.activated, 1);
    assert_eq!(first.executed, 1);
    assert_eq!(first.participations, 2);
    assert_eq!(first.regenerated, 0);

    let second = te.engine.scheduler().tick(start + Duration::minutes(2)).await.unwrap();
    assert!(second.is_idle());
    assert_eq!(te.ledger.grants().await.len(), 2);
    assert_eq!(schedules_of(&te, id).await.len(), 1);
}

#[tokio::test]
async fn fan_out_reaches_only_eligible_users() {
    let users = vec![
        UserProfile::new("junior", t0() - Duration::days(400)).with_level(1),
        UserProfile::new("senior", t0() - Duration::days(400)).with_level(5),
    ];
    let te = engine(users).await;
    let start = t0() + Duration::hours(1);
    let activity = scheduled(15, start, start + Duration::days(1)).with_target(TargetRule::ByLevel { min_level: 3 });
    let id = publish(&te, activity, t0()).await;

    let report = te.engine.scheduler().tick(start).await.unwrap();
    assert_eq!(report.participations, 1);

    assert!(te.engine.participations().get(id, "junior").await.unwrap().is_none());
    assert_eq!(te.ledger.balance("senior").await, 15);
    assert_eq!(te.ledger.balance("junior").await, 0);
}

#[tokio::test]
async fn schedule_of_cancelled_activity_fails_without_regenerating() {
    let te = engine(seasoned_users(1)).await;
    let start = t0() + Duration::hours(1);
    let activity = scheduled(10, start, start + Duration::days(5)).with_repeat(RepeatPattern::Daily, None);
    let id = publish(&te, activity, t0()).await;
    te.engine.activities().cancel(id, t0()).await.unwrap();

    let report = te.engine.scheduler().tick(start + Duration::minutes(1)).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.regenerated, 0);

    let schedules = schedules_of(&te, id).await;
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].status, ScheduleStatus::Failed);
    assert_eq!(te.ledger.attempts().await, 0);
}

#[tokio::test]
async fn interrupted_execution_is_recovered_after_grace() {
    let te = engine(seasoned_users(1)).await;
    let start = t0() + Duration::hours(1);
    let activity = scheduled(10, start, start + Duration::days(5)).with_repeat(RepeatPattern::Daily, None);
    let id = publish(&te, activity, t0()).await;

    let stuck = schedules_of(&te, id).await.remove(0);
    assert!(te.engine.schedules().claim(stuck.id, start).await.unwrap());

    // Still inside the grace period: left alone.
    let early = te.engine.scheduler().tick(start + Duration::minutes(5)).await.unwrap();
    assert_eq!(early.recovered, 0);

    let grace = te.engine.scheduler().config().executing_grace_secs as i64;
    let report = te
        .engine
        .scheduler()
        .tick(start + Duration::seconds(grace) + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(report.regenerated, 1);

    let recovered = te.engine.schedules().get(stuck.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, ScheduleStatus::Failed);
    assert_eq!(recovered.error_message.as_deref(), Some("execution interrupted"));

    let schedules = schedules_of(&te, id).await;
    assert_eq!(schedules.len(), 2);
    assert_eq!(schedules[1].scheduled_time, start + Duration::days(1));
    assert_eq!(schedules[1].status, ScheduleStatus::Pending);
}

#[tokio::test]
async fn expired_activities_are_completed_with_fresh_statistics() {
    let te = engine(seasoned_users(2)).await;
    let start = t0();
    let end = start + Duration::days(1);
    let id = publish(&te, scheduled(10, start, end), start).await;

    te.engine.scheduler().tick(start + Duration::minutes(1)).await.unwrap();
    let report = te.engine.scheduler().tick(end + Duration::minutes(1)).await.unwrap();
    assert_eq!(report.expired, 1);

    let activity = te.engine.activities().get(id).await.unwrap();
    assert_eq!(activity.status, ActivityStatus::Completed);

    let stats = te.engine.statistics().get(id, end + Duration::minutes(2)).await.unwrap();
    assert_eq!(stats.total_participants, 2);
    assert_eq!(stats.total_credits_awarded, 20);
}

#[tokio::test]
async fn daemon_ticks_until_stopped() {
    let te = engine(Vec::new()).await;
    let daemon = te
        .engine
        .daemon()
        .with_tick_interval(std::time::Duration::from_millis(20));
    let handle = daemon.handle();
    let mut events = daemon.run();

    assert!(matches!(events.recv().await, Some(SchedulerEvent::Started)));
    assert!(matches!(
        events.recv().await,
        Some(SchedulerEvent::TickCompleted { tick_number: 1, .. })
    ));

    handle.stop();
    let stopped = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if let SchedulerEvent::Stopped { reason } = event {
                return Some(reason);
            }
        }
        None
    })
    .await
    .unwrap();
    assert_eq!(stopped, Some(StopReason::Requested));

    let status = handle.status().await;
    assert!(!status.running);
    assert!(status.successful_ticks >= 1);
}
