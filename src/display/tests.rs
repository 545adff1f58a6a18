use super::*;
use crate::channels::adapter::{ChannelAdapter, MessageHandler};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

struct MockAdapter {
    name: String,
    channel_type: String,
    sent: AtomicUsize,
    last_text: Mutex<Option<String>>,
    running: AtomicBool,
}

impl MockAdapter {
    fn new(name: &str, channel_type: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            channel_type: channel_type.to_string(),
            sent: AtomicUsize::new(0),
            last_text: Mutex::new(None),
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
    async fn send(&self, msg: &OutboundMessage) -> bool {
        self.sent.fetch_add(1, Ordering::SeqCst);
        *self.last_text.lock().unwrap() = Some(msg.text.clone());
        true
    }
    fn set_on_message(&self, _handler: MessageHandler) {}
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn plain_text_routes_to_originating_adapter() {
    let chat = MockAdapter::new("support-webhook", "webhook");
    let set = ChannelSet::new(vec![chat.clone()]);
    let router = DisplayRouter::new();

    let ok = router
        .route(&set, "just chatting", &OutboundMetadata::default(), "support-webhook", None, vec![])
        .await;
    assert!(ok);
    assert_eq!(chat.sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn display_envelope_routes_to_canvas_when_present() {
    let chat = MockAdapter::new("support-webhook", "webhook");
    let canvas = MockAdapter::new("canvas-main", "canvas");
    let set = ChannelSet::new(vec![chat.clone(), canvas.clone()]);
    let router = DisplayRouter::new();

    let text = r#"{"content_type":"chart","content":"spec","id":"c1","title":"T"}"#;
    let ok = router
        .route(&set, text, &OutboundMetadata::default(), "support-webhook", None, vec![])
        .await;
    assert!(ok);
    assert_eq!(canvas.sent.load(Ordering::SeqCst), 1);
    assert_eq!(chat.sent.load(Ordering::SeqCst), 0);
    assert_eq!(router.canvas_state().snapshot().len(), 1);
}

#[tokio::test]
async fn display_envelope_falls_back_to_chat_adapter_without_canvas() {
    let chat = MockAdapter::new("support-webhook", "webhook");
    let set = ChannelSet::new(vec![chat.clone()]);
    let router = DisplayRouter::new();

    let text = r#"{"content_type":"svg","content":"<svg/>","id":"c2"}"#;
    let ok = router
        .route(&set, text, &OutboundMetadata::default(), "support-webhook", None, vec![])
        .await;
    assert!(ok);
    assert_eq!(chat.sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn updating_same_id_replaces_item_in_place() {
    let canvas = MockAdapter::new("canvas-main", "canvas");
    let set = ChannelSet::new(vec![canvas.clone()]);
    let router = DisplayRouter::new();

    let first = r#"{"content_type":"chart","content":"v1","id":"c1"}"#;
    let second = r#"{"content_type":"chart","content":"v2","id":"c1"}"#;
    router
        .route(&set, first, &OutboundMetadata::default(), "canvas-main", None, vec![])
        .await;
    router
        .route(&set, second, &OutboundMetadata::default(), "canvas-main", None, vec![])
        .await;

    let snapshot = router.canvas_state().snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].content, "v2");
}

#[tokio::test]
async fn metadata_content_type_without_envelope_json_targets_canvas() {
    let canvas = MockAdapter::new("canvas-main", "canvas");
    let set = ChannelSet::new(vec![canvas.clone()]);
    let router = DisplayRouter::new();

    let metadata = OutboundMetadata {
        content_type: Some(DisplayContentType::Markdown),
        id: Some("notes".to_string()),
    };
    let ok = router.route(&set, "# hi", &metadata, "canvas-main", None, vec![]).await;
    assert!(ok);
    assert_eq!(canvas.sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upsert_broadcasts_to_subscribers() {
    let canvas = MockAdapter::new("canvas-main", "canvas");
    let set = ChannelSet::new(vec![canvas.clone()]);
    let router = DisplayRouter::new();
    let mut updates = router.canvas_state().subscribe();

    let text = r#"{"content_type":"chart","content":"v1","id":"c1"}"#;
    router
        .route(&set, text, &OutboundMetadata::default(), "canvas-main", None, vec![])
        .await;

    let item = updates.recv().await.unwrap();
    assert_eq!(item.id, "c1");
    assert_eq!(item.content, "v1");
}

#[tokio::test]
async fn no_matching_adapter_returns_false() {
    let set = ChannelSet::new(vec![]);
    let router = DisplayRouter::new();
    let ok = router
        .route(&set, "hi", &OutboundMetadata::default(), "ghost", None, vec![])
        .await;
    assert!(!ok);
}
