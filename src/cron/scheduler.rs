//! Cron scheduler: a single background task sleeps until the next job's
//! firing time, then spawns that firing onto its own task so one slow
//! handler never blocks another job's timer. Grounded closely on the
//! teacher's `cron/service.rs` tick loop and its cron-expression
//! normalization (`validate_cron_expr`); the teacher's single
//! `last_status`/`last_error` fields are replaced with a bounded history
//! ring per spec §4.6's explicit call for one.

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::DateTime;
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::types::{CronSchedule, ExecutionRecord, ExecutionStatus, ScheduledJob};
use crate::utils::task_tracker::TaskTracker;

const DEFAULT_HISTORY_CAPACITY: usize = 100;
const POLL_WHEN_EMPTY_MS: u64 = 30_000;
const MIN_SLEEP_MS: i64 = 200;
const MAX_SLEEP_MS: u64 = 30_000;

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Normalizes a cron expression to 6+ fields (prepending a `0` seconds
/// field if given 5) and validates it parses.
pub fn validate_cron_expr(expr: &str) -> anyhow::Result<String> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    normalized
        .parse::<Schedule>()
        .map_err(|e| anyhow::anyhow!("invalid cron expression '{expr}': {e}"))?;
    Ok(normalized)
}

pub fn compute_next_run(schedule: &CronSchedule, now: i64) -> Option<i64> {
    match schedule {
        CronSchedule::At { at_ms } => (*at_ms > now).then_some(*at_ms),
        CronSchedule::Every { every_ms } => (*every_ms > 0).then_some(now + every_ms),
        CronSchedule::Cron { expr, tz } => {
            let normalized = validate_cron_expr(expr).ok()?;
            let parsed = normalized.parse::<Schedule>().ok()?;
            let tz: Tz = tz
                .as_deref()
                .and_then(|t| t.parse().ok())
                .unwrap_or(Tz::UTC);
            let now_dt: DateTime<Tz> = DateTime::from_timestamp_millis(now)?.with_timezone(&tz);
            parsed.after(&now_dt).next().map(|dt| dt.timestamp_millis())
        }
    }
}

/// Async callback invoked on each firing. Returns `Ok(Some(result))` for a
/// successful run that produced output, `Ok(None)` for a successful run
/// with nothing to report, `Err` for a failed run (recorded, not retried).
pub type JobHandler =
    Arc<dyn Fn(ScheduledJob) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<String>>> + Send>> + Send + Sync>;

pub struct CronScheduler {
    jobs: Mutex<Vec<ScheduledJob>>,
    history: Mutex<std::collections::HashMap<String, VecDeque<ExecutionRecord>>>,
    handler: Mutex<Option<JobHandler>>,
    running: Arc<std::sync::atomic::AtomicBool>,
    pub(crate) history_capacity: usize,
    tasks: TaskTracker,
}

impl CronScheduler {
    pub fn new(jobs: Vec<ScheduledJob>) -> Self {
        Self {
            jobs: Mutex::new(jobs),
            history: Mutex::new(std::collections::HashMap::new()),
            handler: Mutex::new(None),
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            tasks: TaskTracker::new(),
        }
    }

    pub async fn set_handler(&self, handler: JobHandler) {
        *self.handler.lock().await = Some(handler);
    }

    pub async fn list_jobs(&self) -> Vec<ScheduledJob> {
        self.jobs.lock().await.clone()
    }

    /// Up to the last `n` execution records for `job_name`, newest first.
    pub async fn history_for(&self, job_name: &str, n: usize) -> Vec<ExecutionRecord> {
        self.history
            .lock()
            .await
            .get(job_name)
            .map(|ring| ring.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }

    /// All recorded executions across every job, newest first, capped at
    /// `n` total.
    pub async fn all_history(&self, n: usize) -> Vec<ExecutionRecord> {
        let history = self.history.lock().await;
        let mut all: Vec<ExecutionRecord> = history.values().flatten().cloned().collect();
        all.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
        all.truncate(n);
        all
    }

    pub(crate) async fn push_history(&self, record: ExecutionRecord) {
        let mut history = self.history.lock().await;
        let ring = history.entry(record.job_name.clone()).or_default();
        ring.push_front(record);
        while ring.len() > self.history_capacity {
            ring.pop_back();
        }
    }

    /// Starts the background timer loop. Idempotent: calling twice replaces
    /// the previous loop task.
    pub async fn start(self: &Arc<Self>) {
        self.running.store(true, std::sync::atomic::Ordering::SeqCst);
        let scheduler = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                if !scheduler.running.load(std::sync::atomic::Ordering::SeqCst) {
                    break;
                }

                let now = now_ms();
                let mut next_wake: Option<i64> = None;

                let due: Vec<ScheduledJob> = {
                    let mut jobs = scheduler.jobs.lock().await;
                    let mut due = Vec::new();
                    for job in jobs.iter_mut() {
                        let job_next = job.next_run.or_else(|| compute_next_run(&job.schedule, now));
                        match job_next {
                            Some(t) if t <= now => {
                                job.last_run = Some(now);
                                job.next_run = compute_next_run(&job.schedule, now);
                                due.push(job.clone());
                            }
                            Some(t) => {
                                job.next_run = Some(t);
                                next_wake = Some(next_wake.map(|n: i64| n.min(t)).unwrap_or(t));
                            }
                            None => {}
                        }
                    }
                    due
                };

                let handler_opt = scheduler.handler.lock().await.clone();
                for job in due {
                    let Some(handler) = handler_opt.clone() else {
                        continue;
                    };
                    let scheduler = scheduler.clone();
                    let job_name = job.name.clone();
                    info!(job = %job_name, "firing scheduled job");
                    scheduler
                        .tasks
                        .spawn_auto_cleanup(format!("cron:{job_name}"), async move {
                            let start = now_ms();
                            let record = match handler(job).await {
                                Ok(result) => ExecutionRecord {
                                    job_name: job_name.clone(),
                                    started_at_ms: start,
                                    duration_ms: (now_ms() - start).max(0) as u64,
                                    status: ExecutionStatus::Ok,
                                    result,
                                },
                                Err(e) => {
                                    error!(job = %job_name, error = %e, "scheduled job failed");
                                    ExecutionRecord {
                                        job_name: job_name.clone(),
                                        started_at_ms: start,
                                        duration_ms: (now_ms() - start).max(0) as u64,
                                        status: ExecutionStatus::Failed,
                                        result: Some(e.to_string()),
                                    }
                                }
                            };
                            scheduler.push_history(record).await;
                        })
                        .await;
                }

                let delay = match next_wake {
                    Some(t) => (t - now_ms()).max(MIN_SLEEP_MS) as u64,
                    None => POLL_WHEN_EMPTY_MS,
                };
                tokio::time::sleep(Duration::from_millis(delay.min(MAX_SLEEP_MS))).await;
            }
        });

        self.tasks.spawn("cron:timer_loop", handle).await;
    }

    pub async fn stop(&self) {
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
        self.tasks.cancel_all().await;
    }

    /// Warns (does not fail) if `tz` in a `Cron` schedule doesn't parse as
    /// an IANA timezone, matching the teacher's `detect_system_timezone`
    /// fallback-to-UTC behavior.
    pub fn validate_schedule(schedule: &CronSchedule) {
        if let CronSchedule::Cron { tz: Some(tz), .. } = schedule
            && tz.parse::<Tz>().is_err()
        {
            warn!(tz = %tz, "unrecognized timezone, falling back to UTC");
        }
    }
}
