use serde::{Deserialize, Serialize};

/// A job's firing schedule. `Cron` covers the "standard 5-field expression"
/// spec §3 names (normalized to 6 fields by prepending a seconds field of
/// `0`, exactly as the teacher's `validate_cron_expr` does); `At`/`Every`
/// cover the "named shorthands" — a one-shot absolute time and a fixed
/// repeat interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CronSchedule {
    At { at_ms: i64 },
    Every { every_ms: i64 },
    Cron { expr: String, tz: Option<String> },
}

/// A scheduled job, per spec §3's "Scheduled job" data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub name: String,
    pub schedule: CronSchedule,
    pub recipe: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub next_run: Option<i64>,
    pub last_run: Option<i64>,
}

impl ScheduledJob {
    pub fn new(name: impl Into<String>, schedule: CronSchedule, recipe: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schedule,
            recipe: recipe.into(),
            context: serde_json::Value::Null,
            next_run: None,
            last_run: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Ok,
    Failed,
}

/// One entry in a job's bounded execution history ring (default 100
/// entries, per spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub job_name: String,
    pub started_at_ms: i64,
    pub duration_ms: u64,
    pub status: ExecutionStatus,
    pub result: Option<String>,
}

/// A heartbeat execution record, per spec §3: `(agent_id, timestamp,
/// status, duration_ms, result?)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub agent_id: String,
    pub timestamp_ms: i64,
    pub status: ExecutionStatus,
    pub duration_ms: u64,
    pub result: Option<String>,
}
