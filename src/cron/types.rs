use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CronSchedule {
    At { at_ms: Option<i64> },
    Every { every_ms: Option<i64> },
    Cron { expr: Option<String>, tz: Option<String> },
}

impl CronSchedule {
    pub fn at(at_ms: i64) -> Self {
        Self::At { at_ms: Some(at_ms) }
    }

    pub fn every(interval_ms: i64) -> Result<Self, anyhow::Error> {
        if interval_ms <= 0 {
            anyhow::bail!("every interval must be > 0ms");
        }
        Ok(Self::Every { every_ms: Some(interval_ms) })
    }

    pub fn cron(expr: impl Into<String>, tz: Option<String>) -> Self {
        Self::Cron {
            expr: Some(expr.into()),
            tz,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CronJobState {
    pub next_run_at_ms: Option<i64>,
    pub last_run_at_ms: Option<i64>,
    #[serde(default = "default_last_status")]
    pub last_status: String,
    pub last_error: Option<String>,
    #[serde(default)]
    pub run_count: u64,
}

fn default_last_status() -> String {
    "idle".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub schedule: CronSchedule,
    pub task: String,
    pub priority: String,
    #[serde(default)]
    pub state: CronJobState,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    #[serde(default)]
    pub delete_after_run: bool,
    #[serde(default)]
    pub expires_at_ms: Option<i64>,
    #[serde(default)]
    pub max_runs: Option<u64>,
}

impl CronJob {
    pub fn new(name: impl Into<String>, schedule: CronSchedule, task: impl Into<String>, priority: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            name: name.into(),
            enabled: true,
            schedule,
            task: task.into(),
            priority: priority.into(),
            state: CronJobState::default(),
            created_at_ms: now,
            updated_at_ms: now,
            delete_after_run: false,
            expires_at_ms: None,
            max_runs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CronStore {
    pub version: u32,
    pub jobs: Vec<CronJob>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateJobParams {
    pub name: Option<String>,
    pub task: Option<String>,
    pub schedule: Option<CronSchedule>,
    pub priority: Option<String>,
}
