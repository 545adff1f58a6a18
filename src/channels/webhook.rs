//! Generic inbound/outbound HTTP adapter. Grounded on the teacher's
//! `gateway::mod` webhook handler: HMAC-SHA256 signature verification with a
//! constant-time comparison, and plain POST delivery outbound.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hex::ToHex;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use super::adapter::{ChannelAdapter, MessageHandler};
use crate::bus::events::{InboundMessage, OutboundMessage};
use crate::bus::ChannelType;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct WebhookConfig {
    /// Shared secret used to verify `X-Signature-256`-style headers on
    /// inbound requests. `None` disables verification.
    #[serde(default)]
    pub secret: Option<String>,
    /// URL to POST outbound messages to. `None` means this instance is
    /// inbound-only.
    #[serde(default)]
    pub outbound_url: Option<String>,
}

pub struct WebhookAdapter {
    name: String,
    config: WebhookConfig,
    client: reqwest::Client,
    handler: Mutex<Option<MessageHandler>>,
    running: AtomicBool,
}

impl WebhookAdapter {
    pub fn new(name: impl Into<String>, config: WebhookConfig) -> Self {
        Self {
            name: name.into(),
            config,
            client: reqwest::Client::new(),
            handler: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn verify_signature(&self, signature_header: Option<&str>, body: &[u8]) -> bool {
        match &self.config.secret {
            None => true,
            Some(secret) => {
                let Some(signature) = signature_header else {
                    return false;
                };
                validate_webhook_signature(secret, signature, body)
            }
        }
    }

    /// Called by the gateway's shared HTTP router when a request lands on
    /// this instance's webhook path. Returns `None` if the adapter isn't
    /// running or has no handler registered yet.
    pub async fn receive(&self, sender_id: String, text: String, raw: Value) -> Option<String> {
        if !self.is_running() {
            return None;
        }
        let handler = self.handler.lock().ok()?.clone()?;
        let msg = InboundMessage {
            channel: ChannelType::new(ChannelType::WEBHOOK),
            channel_name: self.name.clone(),
            sender_id,
            sender_label: None,
            text,
            thread_id: None,
            attachments: vec![],
            timestamp: chrono::Utc::now(),
            raw,
        };
        Some(handler(msg).await)
    }
}

/// Computes the expected HMAC-SHA256 signature for `body` under `secret` and
/// compares it to `signature` (optionally `sha256=`-prefixed) in constant
/// time.
pub fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected: String = mac.finalize().into_bytes().encode_hex();

    let provided = signature.strip_prefix("sha256=").unwrap_or(signature);
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        ChannelType::WEBHOOK
    }

    async fn start(&self) -> anyhow::Result<()> {
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
        let Some(url) = &self.config.outbound_url else {
            warn!(channel = %self.name, "webhook adapter has no outbound_url configured");
            return false;
        };
        match self.client.post(url).json(msg).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(channel = %self.name, status = %resp.status(), "webhook delivery rejected");
                false
            }
            Err(e) => {
                warn!(channel = %self.name, error = %e, "webhook delivery failed");
                false
            }
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

    #[test]
    fn signature_with_prefix_matches() {
        let secret = "s3cr3t";
        let body = b"{\"a\":1}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig: String = mac.finalize().into_bytes().encode_hex();
        assert!(validate_webhook_signature(secret, &format!("sha256={sig}"), body));
    }

    #[test]
    fn wrong_signature_is_rejected() {
        assert!(!validate_webhook_signature("s3cr3t", "sha256=deadbeef", b"body"));
    }

    #[tokio::test]
    async fn adapter_not_running_rejects_inbound() {
        let adapter = WebhookAdapter::new("wh", WebhookConfig::default());
        let result = adapter
            .receive("u1".into(), "hi".into(), Value::Null)
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn send_without_outbound_url_returns_false() {
        let adapter = WebhookAdapter::new("wh", WebhookConfig::default());
        adapter.start().await.unwrap();
        let msg = OutboundMessage::new(ChannelType::new("webhook"), "wh", "hi");
        assert!(!adapter.send(&msg).await);
    }

    #[tokio::test]
    async fn start_stop_start_yields_true_false_true() {
        let adapter = WebhookAdapter::new("wh", WebhookConfig::default());
        assert!(!adapter.is_running());
        adapter.start().await.unwrap();
        assert!(adapter.is_running());
        adapter.stop().await.unwrap();
        assert!(!adapter.is_running());
        adapter.start().await.unwrap();
        assert!(adapter.is_running());
    }
}
