use super::*;
use crate::bus::ChannelType;
use crate::channels::adapter::{ChannelAdapter, MessageHandler};
use crate::cron::CronScheduler;
use crate::router::Backend;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

struct MockAdapter {
    name: String,
    channel_type: String,
    sent: AtomicUsize,
    running: AtomicBool,
}

impl MockAdapter {
    fn new(name: &str, channel_type: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            channel_type: channel_type.to_string(),
            sent: AtomicUsize::new(0),
            running: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl ChannelAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }
    fn channel_type(&self) -> &str {
        &self.channel_type
    }
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn send(&self, _msg: &OutboundMessage) -> bool {
        self.sent.fetch_add(1, Ordering::SeqCst);
        true
    }
    fn set_on_message(&self, _handler: MessageHandler) {}
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct EchoBackend;

#[async_trait]
impl Backend for EchoBackend {
    async fn reply(&self, message: &InboundMessage, _session_id: &str) -> anyhow::Result<String> {
        Ok(format!("you said: {}", message.text))
    }
}

fn inbound(sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        channel: ChannelType::new("webhook"),
        channel_name: "support".to_string(),
        sender_id: sender.to_string(),
        sender_label: None,
        text: text.to_string(),
        thread_id: None,
        attachments: vec![],
        timestamp: chrono::Utc::now(),
        raw: serde_json::Value::Null,
    }
}

fn daemon(dir: &tempfile::TempDir) -> Arc<GatewayDaemon> {
    let chat = MockAdapter::new("support", "webhook");
    let channels = ChannelSet::new(vec![chat]);
    let pairing = Arc::new(
        PairingStore::new(dir.path().join("pairing.json"), 300, 3).unwrap(),
    );
    let router = Arc::new(SessionRouter::new(Arc::new(EchoBackend), Duration::from_secs(300)));
    let scheduler = Arc::new(CronScheduler::new(vec![]));
    Arc::new(GatewayDaemon::new(
        channels,
        pairing,
        router,
        scheduler,
        dir.path().join("files"),
        Duration::from_secs(300),
    ))
}

#[tokio::test]
async fn first_contact_prompts_for_pairing_code() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = daemon(&dir);
    let reply = daemon.on_message(inbound("u1", "hello")).await;
    assert!(reply.contains("pairing code"));
    let senders = daemon.pairing().get_all_senders(None);
    assert_eq!(senders[0].status, crate::pairing::AuthStatus::Pending);
}

#[tokio::test]
async fn supplying_the_code_approves_the_sender() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = daemon(&dir);
    let prompt = daemon.on_message(inbound("u1", "hello")).await;
    let code = prompt.rsplit(':').next().unwrap().trim();

    let reply = daemon.on_message(inbound("u1", code)).await;
    assert!(reply.to_lowercase().contains("approved"));
    assert!(daemon.pairing().is_approved("u1", "webhook"));
}

#[tokio::test]
async fn approved_sender_gets_routed_to_backend() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = daemon(&dir);
    let prompt = daemon.on_message(inbound("u1", "hello")).await;
    let code = prompt.rsplit(':').next().unwrap().trim();
    daemon.on_message(inbound("u1", code)).await;

    let reply = daemon.on_message(inbound("u1", "what's up")).await;
    assert_eq!(reply, "you said: what's up");
}

#[tokio::test]
async fn rate_limited_sender_gets_a_notice_and_is_not_routed() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = daemon(&dir);
    let prompt = daemon.on_message(inbound("u1", "hello")).await;
    let code = prompt.rsplit(':').next().unwrap().trim();
    daemon.on_message(inbound("u1", code)).await;

    for _ in 0..3 {
        daemon.on_message(inbound("u1", "hi")).await;
    }
    let reply = daemon.on_message(inbound("u1", "hi")).await;
    assert!(reply.to_lowercase().contains("rate limit"));
}

#[tokio::test]
async fn blocked_sender_gets_terse_refusal_and_no_backend_call() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = daemon(&dir);
    let prompt = daemon.on_message(inbound("u1", "hello")).await;
    let code = prompt.rsplit(':').next().unwrap().trim();
    daemon.on_message(inbound("u1", code)).await;

    daemon.pairing().block_sender("u1", "webhook").unwrap();
    let reply = daemon.on_message(inbound("u1", "hi")).await;
    assert!(reply.to_lowercase().contains("blocked"));
}

#[tokio::test]
async fn heartbeat_message_bypasses_pairing_and_reaches_backend() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = daemon(&dir);
    let message = crate::cron::heartbeat::synthesize_heartbeat_message("alice", "support");

    let reply = daemon.on_message(message).await;
    assert_eq!(reply, "you said: HEARTBEAT");
    assert!(daemon.pairing().get_all_senders(None).is_empty());
}

#[tokio::test]
async fn session_continuity_across_two_approved_messages() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = daemon(&dir);
    let prompt = daemon.on_message(inbound("u1", "hello")).await;
    let code = prompt.rsplit(':').next().unwrap().trim();
    daemon.on_message(inbound("u1", code)).await;

    daemon.on_message(inbound("u1", "one")).await;
    daemon.on_message(inbound("u1", "two")).await;

    let sessions = daemon.router().active_sessions().await;
    let handle = sessions.get("webhook:support:u1").unwrap();
    assert_eq!(handle.message_count, 2);
}
