use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn compute_next_run_for_every_adds_interval() {
    let schedule = CronSchedule::Every { every_ms: 1000 };
    assert_eq!(compute_next_run(&schedule, 5000), Some(6000));
}

#[test]
fn compute_next_run_for_past_at_is_none() {
    let schedule = CronSchedule::At { at_ms: 100 };
    assert_eq!(compute_next_run(&schedule, 5000), None);
}

#[test]
fn compute_next_run_for_future_at_returns_it() {
    let schedule = CronSchedule::At { at_ms: 9000 };
    assert_eq!(compute_next_run(&schedule, 5000), Some(9000));
}

#[test]
fn validate_cron_expr_normalizes_five_field() {
    let normalized = validate_cron_expr("0 0 * * *").unwrap();
    assert!(normalized.starts_with("0 0 0 "));
}

#[test]
fn validate_cron_expr_rejects_garbage() {
    assert!(validate_cron_expr("not a cron expression").is_err());
}

#[tokio::test]
async fn firing_job_records_ok_history() {
    let job = ScheduledJob::new(
        "ping",
        CronSchedule::At { at_ms: now_ms() - 1 },
        "noop",
    );
    let scheduler = Arc::new(CronScheduler::new(vec![job]));
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    scheduler
        .set_handler(Arc::new(move |_job| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some("done".to_string()))
            })
        }))
        .await;

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.stop().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let history = scheduler.history_for("ping", 10).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExecutionStatus::Ok);
}

#[tokio::test]
async fn failing_job_is_recorded_and_scheduler_continues() {
    let job_a = ScheduledJob::new("fails", CronSchedule::At { at_ms: now_ms() - 1 }, "noop");
    let job_b = ScheduledJob::new("ok", CronSchedule::At { at_ms: now_ms() - 1 }, "noop");
    let scheduler = Arc::new(CronScheduler::new(vec![job_a, job_b]));

    scheduler
        .set_handler(Arc::new(|job| {
            Box::pin(async move {
                if job.name == "fails" {
                    anyhow::bail!("boom")
                } else {
                    Ok(None)
                }
            })
        }))
        .await;

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.stop().await;

    let failed = scheduler.history_for("fails", 10).await;
    assert_eq!(failed[0].status, ExecutionStatus::Failed);
    let ok = scheduler.history_for("ok", 10).await;
    assert_eq!(ok[0].status, ExecutionStatus::Ok);
}

#[tokio::test]
async fn history_ring_is_bounded() {
    let mut scheduler = CronScheduler::new(vec![]);
    scheduler.history_capacity = 3;
    for i in 0..5 {
        scheduler
            .push_history(ExecutionRecord {
                job_name: "j".to_string(),
                started_at_ms: i,
                duration_ms: 0,
                status: ExecutionStatus::Ok,
                result: None,
            })
            .await;
    }
    assert_eq!(scheduler.history_for("j", 10).await.len(), 3);
}
