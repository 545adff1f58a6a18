//! Heartbeat engine: a scheduled job kind whose handler synthesizes an
//! `InboundMessage` from a synthetic sender and runs it through the same
//! inbound pipeline as real messages, letting the backend take a
//! self-initiated turn. Grounded on the teacher's `heartbeat/service.rs`
//! (a dedicated interval timer firing a fixed prompt) generalized per
//! SPEC_FULL §9 into a `CronPayload` kind so each configured agent can run
//! its own cadence on the one shared scheduler loop, instead of the
//! teacher's single always-on workspace timer.

use std::sync::Arc;

use chrono::Utc;

use super::scheduler::{now_ms, CronScheduler};
use super::types::{ExecutionStatus, HeartbeatRecord, ScheduledJob};
use crate::bus::events::InboundMessage;
use crate::bus::ChannelType;

/// The `recipe` value used to mark a `ScheduledJob` as a heartbeat rather
/// than an arbitrary cron recipe.
pub const HEARTBEAT_RECIPE: &str = "heartbeat";

/// Synthesizes the `InboundMessage` a heartbeat firing delivers to the
/// inbound pipeline: a synthetic sender on the agent's designated
/// heartbeat channel.
pub fn synthesize_heartbeat_message(agent_id: &str, channel_name: &str) -> InboundMessage {
    InboundMessage {
        channel: ChannelType::new(ChannelType::HEARTBEAT),
        channel_name: channel_name.to_string(),
        sender_id: format!("heartbeat:{agent_id}"),
        sender_label: Some("heartbeat".to_string()),
        text: "HEARTBEAT".to_string(),
        thread_id: None,
        attachments: vec![],
        timestamp: Utc::now(),
        raw: serde_json::json!({ "agent_id": agent_id }),
    }
}

/// Thin read-only view over the scheduler's execution records, filtered to
/// jobs whose recipe is `"heartbeat"`.
pub struct HeartbeatEngine {
    scheduler: Arc<CronScheduler>,
}

impl HeartbeatEngine {
    pub fn new(scheduler: Arc<CronScheduler>) -> Self {
        Self { scheduler }
    }

    fn job_agent_id(job: &ScheduledJob) -> Option<String> {
        job.context.get("agent_id").and_then(|v| v.as_str()).map(str::to_string)
    }

    /// Recent heartbeat executions, newest first, across every configured
    /// agent.
    pub async fn history(&self, limit: usize) -> Vec<HeartbeatRecord> {
        let jobs = self.scheduler.list_jobs().await;
        let mut records = Vec::new();
        for job in jobs.into_iter().filter(|j| j.recipe == HEARTBEAT_RECIPE) {
            let Some(agent_id) = Self::job_agent_id(&job) else {
                continue;
            };
            for exec in self.scheduler.history_for(&job.name, limit).await {
                records.push(HeartbeatRecord {
                    agent_id: agent_id.clone(),
                    timestamp_ms: exec.started_at_ms,
                    status: exec.status,
                    duration_ms: exec.duration_ms,
                    result: exec.result,
                });
            }
        }
        records.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        records.truncate(limit);
        records
    }

    /// The most recent heartbeat execution for `agent_id`, if any.
    pub async fn last_result(&self, agent_id: &str) -> Option<HeartbeatRecord> {
        self.history(usize::MAX)
            .await
            .into_iter()
            .find(|r| r.agent_id == agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::types::{CronSchedule, ExecutionRecord};

    fn job(agent_id: &str) -> ScheduledJob {
        let mut job = ScheduledJob::new(
            format!("heartbeat:{agent_id}"),
            CronSchedule::Every { every_ms: 60_000 },
            HEARTBEAT_RECIPE,
        );
        job.context = serde_json::json!({ "agent_id": agent_id });
        job
    }

    #[tokio::test]
    async fn last_result_returns_none_with_no_history() {
        let scheduler = Arc::new(CronScheduler::new(vec![job("alice")]));
        let engine = HeartbeatEngine::new(scheduler);
        assert!(engine.last_result("alice").await.is_none());
    }

    #[tokio::test]
    async fn history_surfaces_recorded_executions_per_agent() {
        let scheduler = Arc::new(CronScheduler::new(vec![job("alice"), job("bob")]));
        scheduler
            .push_history(ExecutionRecord {
                job_name: "heartbeat:alice".to_string(),
                started_at_ms: now_ms(),
                duration_ms: 5,
                status: ExecutionStatus::Ok,
                result: Some("HEARTBEAT_OK".to_string()),
            })
            .await;

        let engine = HeartbeatEngine::new(scheduler);
        let last = engine.last_result("alice").await.unwrap();
        assert_eq!(last.result.as_deref(), Some("HEARTBEAT_OK"));
        assert!(engine.last_result("bob").await.is_none());
    }

    #[test]
    fn synthesized_message_carries_synthetic_sender() {
        let msg = synthesize_heartbeat_message("alice", "cli-main");
        assert_eq!(msg.sender_id, "heartbeat:alice");
        assert_eq!(msg.channel_name, "cli-main");
    }
}
