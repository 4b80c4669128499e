//! Common test utilities for integration tests
//!
//! Builds an engine over an in-memory SQLite store with in-memory platform
//! fakes, plus helpers to seed users and launch activities.

#![allow(dead_code)]

use activity_engine::adapters::platform::{InMemoryCreditLedger, InMemoryUserDirectory};
use activity_engine::adapters::sqlite::{create_migrated_test_pool, initialize_database};
use activity_engine::domain::models::{Activity, Config, DatabaseConfig, RewardRule, TriggerRule, UserProfile};
use activity_engine::services::ActivityEngine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEngine {
    pub engine: ActivityEngine,
    pub ledger: Arc<InMemoryCreditLedger>,
    pub users: Arc<InMemoryUserDirectory>,
}

/// A fixed reference instant so tests do not depend on the wall clock.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Users `u-1` .. `u-n`, all older than the new-user window.
pub fn seasoned_users(n: usize) -> Vec<UserProfile> {
    (1..=n)
        .map(|i| UserProfile::new(format!("u-{i}"), t0() - Duration::days(400)).with_level(1))
        .collect()
}

pub async fn engine_with(config: Config, users: Vec<UserProfile>) -> TestEngine {
    let pool = create_migrated_test_pool().await.expect("test pool");
    build(pool, config, users)
}

pub async fn engine(users: Vec<UserProfile>) -> TestEngine {
    engine_with(Config::default(), users).await
}

/// Engine over a file database with a multi-connection pool.
pub async fn file_engine(users: Vec<UserProfile>) -> (TempDir, TestEngine) {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = Config {
        database: DatabaseConfig {
            path: dir.path().join("activities.db").to_string_lossy().to_string(),
            max_connections: 8,
        },
        ..Config::default()
    };
    let pool = initialize_database(&config.database).await.expect("file pool");
    (dir, build(pool, config, users))
}

fn build(pool: sqlx::SqlitePool, config: Config, users: Vec<UserProfile>) -> TestEngine {
    let ledger = Arc::new(InMemoryCreditLedger::new());
    let users = Arc::new(InMemoryUserDirectory::with_users(users));
    let engine = ActivityEngine::new(pool, ledger.clone(), users.clone(), &config);
    TestEngine { engine, ledger, users }
}

/// A login-triggered activity running from `t0` for a week.
pub fn login_activity(credits: i64) -> Activity {
    Activity::new(
        "Daily login bonus",
        TriggerRule::Login,
        RewardRule::fixed(credits),
        t0(),
        t0() + Duration::days(7),
    )
}

/// Create, publish and start an activity at its start time.
pub async fn launch(engine: &ActivityEngine, activity: Activity) -> Activity {
    let start = activity.start_time;
    let created = engine.activities().create(activity, start).await.expect("create");
    engine.activities().publish(created.id, start).await.expect("publish");
    engine.activities().start(created.id, start).await.expect("start")
}

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
