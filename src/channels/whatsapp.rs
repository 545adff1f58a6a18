//! WhatsApp Cloud API adapter over plain `reqwest`. Grounded on the
//! teacher's webhook-shaped HTTP channels (Twilio, webhook) rather than the
//! `wa-rs` multi-device protocol library — the Cloud API is the
//! idiomatic, officially supported integration path and needs no vendored
//! protocol stack.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::adapter::{ChannelAdapter, MessageHandler};
use crate::bus::events::{InboundMessage, OutboundMessage};
use crate::bus::ChannelType;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct WhatsAppConfig {
    pub phone_number_id: String,
    pub access_token: String,
}

pub struct WhatsAppAdapter {
    name: String,
    config: WhatsAppConfig,
    client: reqwest::Client,
    handler: Mutex<Option<MessageHandler>>,
    running: AtomicBool,
}

impl WhatsAppAdapter {
    pub fn new(name: impl Into<String>, config: WhatsAppConfig) -> Self {
        Self {
            name: name.into(),
            config,
            client: reqwest::Client::new(),
            handler: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Called by the gateway's shared HTTP router when the Cloud API posts a
    /// webhook event to this instance's callback path.
    pub async fn receive(&self, body: &Value) -> Option<String> {
        if !self.is_running() {
            return None;
        }
        let message = body
            .pointer("/entry/0/changes/0/value/messages/0")
            .cloned()?;
        let from = message.get("from").and_then(Value::as_str)?.to_string();
        let text = message.pointer("/text/body").and_then(Value::as_str)?.to_string();

        let handler = self.handler.lock().ok().and_then(|g| g.clone())?;
        let inbound = InboundMessage {
            channel: ChannelType::new(ChannelType::WHATSAPP),
            channel_name: self.name.clone(),
            sender_id: from,
            sender_label: None,
            text,
            thread_id: None,
            attachments: vec![],
            timestamp: chrono::Utc::now(),
            raw: message,
        };
        Some(handler(inbound).await)
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        ChannelType::WHATSAPP
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.config.access_token.trim().is_empty() || self.config.phone_number_id.trim().is_empty() {
            warn!(channel = %self.name, "whatsapp adapter missing credentials; leaving it stopped");
            return Ok(());
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> bool {
        if !self.is_running() {
            return false;
        }
        let url = format!(
            "https://graph.facebook.com/v20.0/{}/messages",
            self.config.phone_number_id
        );
        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": msg.thread_id,
            "text": { "body": msg.text },
        });
        match self
            .client
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn set_on_message(&self, handler: MessageHandler) {
        if let Ok(mut guard) = self.handler.lock() {
            *guard = Some(handler);
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_without_credentials_leaves_adapter_stopped() {
        let adapter = WhatsAppAdapter::new("wa", WhatsAppConfig::default());
        adapter.start().await.unwrap();
        assert!(!adapter.is_running());
    }

    #[tokio::test]
    async fn receive_ignores_malformed_payloads() {
        let adapter = WhatsAppAdapter::new(
            "wa",
            WhatsAppConfig {
                phone_number_id: "123".into(),
                access_token: "tok".into(),
            },
        );
        adapter.start().await.unwrap();
        let reply = adapter.receive(&serde_json::json!({})).await;
        assert!(reply.is_none());
    }
}
