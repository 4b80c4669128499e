use serde::{Deserialize, Serialize};

/// Main configuration structure for the activity engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Participation and reward tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Background scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Platform services (credit ledger, user directory)
    #[serde(default)]
    pub platform: PlatformConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".activity-engine/activities.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Participation and reward tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Upper bound on a single credit ledger call
    #[serde(default = "default_ledger_timeout_ms")]
    pub ledger_timeout_ms: u64,

    /// Accounts younger than this count as new users
    #[serde(default = "default_new_user_window_days")]
    pub new_user_window_days: u32,

    /// Cached statistics older than this are recomputed on read
    #[serde(default = "default_statistics_staleness_secs")]
    pub statistics_staleness_secs: u64,

    /// Delay before retrying a participation transaction that hit lock contention
    #[serde(default = "default_transaction_retry_backoff_ms")]
    pub transaction_retry_backoff_ms: u64,
}

const fn default_ledger_timeout_ms() -> u64 {
    3000
}

const fn default_new_user_window_days() -> u32 {
    30
}

const fn default_statistics_staleness_secs() -> u64 {
    3600
}

const fn default_transaction_retry_backoff_ms() -> u64 {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger_timeout_ms: default_ledger_timeout_ms(),
            new_user_window_days: default_new_user_window_days(),
            statistics_staleness_secs: default_statistics_staleness_secs(),
            transaction_retry_backoff_ms: default_transaction_retry_backoff_ms(),
        }
    }
}

/// Background scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// A schedule left `executing` longer than this is marked failed
    #[serde(default = "default_executing_grace_secs")]
    pub executing_grace_secs: u64,
}

const fn default_tick_interval_secs() -> u64 {
    60
}

const fn default_executing_grace_secs() -> u64 {
    900
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            executing_grace_secs: default_executing_grace_secs(),
        }
    }
}

/// Platform services configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlatformConfig {
    /// Base URL of the platform API serving credits and users
    #[serde(default = "default_platform_base_url")]
    pub base_url: String,

    /// Bearer token for the platform API
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_platform_base_url() -> String {
    "http://127.0.0.1:8080/api/v1".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_base_url(),
            api_token: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}
