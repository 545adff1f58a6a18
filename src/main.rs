//! Thin binary wrapper around the `multigate` library: loads a config file,
//! builds a `GatewayDaemon`, and runs it to completion under Tokio, the way
//! the teacher's `src/main.rs` defers immediately to `cli::run()`. Since the
//! agent backend itself is out of scope (see `SPEC_FULL.md` §1), this binary
//! wires a trivial echo `Backend` so `multigate` is runnable standalone for
//! manual testing; embedding in a real agent means depending on the library
//! and supplying a real `Backend` impl instead of this binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn};

use multigate::bus::events::{InboundMessage, OutboundMessage};
use multigate::channels::set::ChannelSet;
use multigate::config::loader::load_config;
use multigate::config::schema::Config;
use multigate::cron::heartbeat::{synthesize_heartbeat_message, HEARTBEAT_RECIPE};
use multigate::cron::{CronSchedule, CronScheduler, ScheduledJob};
use multigate::daemon::GatewayDaemon;
use multigate::pairing::PairingStore;
use multigate::registry::PluginRegistry;
use multigate::router::{Backend, SessionRouter};

#[derive(Parser)]
#[command(name = "multigate", about = "Multi-channel message gateway")]
struct Cli {
    /// Path to the gateway's TOML (or JSON) configuration document.
    #[arg(long, default_value = "multigate.toml")]
    config: PathBuf,
}

/// Echoes the inbound text back, prefixed with the route key it arrived on.
/// Stands in for a real agent backend, which is out of scope.
struct EchoBackend;

#[async_trait]
impl Backend for EchoBackend {
    async fn reply(&self, message: &InboundMessage, _session_id: &str) -> Result<String> {
        Ok(format!("[{}] {}", message.route_key(), message.text))
    }
}

fn build_channels(config: &Config) -> ChannelSet {
    let registry = PluginRegistry::discover_channels();
    let mut adapters = Vec::new();
    for (name, channel_config) in &config.channels {
        match registry.resolve(&channel_config.channel_type) {
            Ok(factory) => match factory(name, &channel_config.settings) {
                Ok(adapter) => adapters.push(Arc::from(adapter)),
                Err(e) => warn!(channel = %name, error = %e, "failed to construct adapter, skipping"),
            },
            Err(e) => warn!(channel = %name, error = %e, "unknown channel type, skipping"),
        }
    }
    ChannelSet::new(adapters)
}

/// Converts configured cron jobs and per-agent heartbeat schedules into the
/// scheduler's `ScheduledJob` list.
fn build_jobs(config: &Config) -> Vec<ScheduledJob> {
    let mut jobs = Vec::new();

    for job in &config.cron.jobs {
        let mut scheduled = ScheduledJob::new(
            job.name.clone(),
            CronSchedule::Cron {
                expr: job.cron.clone(),
                tz: None,
            },
            job.recipe.clone(),
        );
        scheduled.context = job.context.clone();
        jobs.push(scheduled);
    }

    for (agent_id, agent) in &config.agents {
        if !agent.heartbeat_enabled || agent.heartbeat_channels.is_empty() {
            continue;
        }
        let mut scheduled = ScheduledJob::new(
            format!("heartbeat:{agent_id}"),
            CronSchedule::Every {
                every_ms: (agent.heartbeat_interval_seconds * 1000) as i64,
            },
            HEARTBEAT_RECIPE,
        );
        scheduled.context = serde_json::json!({
            "agent_id": agent_id,
            "channels": agent.heartbeat_channels,
        });
        jobs.push(scheduled);
    }

    jobs
}

/// Builds the scheduler's job-firing callback. A `heartbeat` recipe runs the
/// synthesized heartbeat message through the full inbound pipeline on every
/// configured channel; any other recipe delivers `context.text` directly to
/// `context.channel_name`, mirroring the teacher's cron "echo mode".
fn job_handler(daemon: Arc<GatewayDaemon>) -> multigate::cron::scheduler::JobHandler {
    Arc::new(move |job: ScheduledJob| {
        let daemon = daemon.clone();
        Box::pin(async move {
            if job.recipe == HEARTBEAT_RECIPE {
                let agent_id = job
                    .context
                    .get("agent_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                let channels: Vec<String> = job
                    .context
                    .get("channels")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();

                let mut last_reply = None;
                for channel_name in channels {
                    let message = synthesize_heartbeat_message(&agent_id, &channel_name);
                    last_reply = Some(daemon.on_message(message).await);
                }
                return Ok(last_reply);
            }

            let Some(channel_name) = job.context.get("channel_name").and_then(|v| v.as_str()) else {
                return Ok(None);
            };
            let Some(text) = job.context.get("text").and_then(|v| v.as_str()) else {
                return Ok(None);
            };
            let Some(channel) = daemon.channels().find(channel_name) else {
                return Err(anyhow::anyhow!("cron job '{}' targets unknown channel '{channel_name}'", job.name));
            };
            let msg = OutboundMessage::new(
                multigate::bus::ChannelType::new(channel.channel_type()),
                channel_name,
                text,
            );
            let sent = daemon.send(&msg).await;
            Ok(Some(format!("delivered={sent}")))
        })
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let channels = build_channels(&config);
    let pairing = Arc::new(PairingStore::new(
        config.auth.pairing_db_path.clone(),
        config.auth.code_ttl_seconds,
        config.auth.max_messages_per_minute,
    )?);
    let router = Arc::new(SessionRouter::new(
        Arc::new(EchoBackend),
        Duration::from_secs(config.auth.idle_timeout_seconds),
    ));
    let scheduler = Arc::new(CronScheduler::new(build_jobs(&config)));

    let daemon = Arc::new(GatewayDaemon::new(
        channels,
        pairing,
        router,
        scheduler.clone(),
        config.files_dir.clone(),
        Duration::from_secs(config.auth.reap_interval_seconds),
    ));
    scheduler.set_handler(job_handler(daemon.clone())).await;

    for adapter in daemon.channels().adapters() {
        adapter.set_on_message(daemon.message_handler());
    }

    daemon.start().await?;

    let admin_task = if config.admin.is_active() {
        let state = multigate::admin::AdminState::new(daemon.clone(), config.admin.token.clone(), config.agents.clone());
        let app = multigate::admin::build_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:8787").await?;
        info!("admin surface listening on 127.0.0.1:8787");
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "admin server exited");
            }
        }))
    } else {
        info!("admin surface disabled (admin.enabled is false or admin.token is empty)");
        None
    };

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown signal received");

    daemon.shutdown(None).await;
    if let Some(task) = admin_task {
        task.abort();
    }

    Ok(())
}
