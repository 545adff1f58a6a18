//! Slack adapter over Socket Mode. Grounded on the teacher's
//! `channels::slack::SlackChannel` (config shape, `reqwest` client, running
//! flag) adapted to a `tokio-tungstenite` socket-mode loop instead of the
//! teacher's combination of Events API + file-upload flow.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tracing::{error, info, warn};

use super::adapter::{ChannelAdapter, MessageHandler};
use crate::bus::events::{InboundMessage, OutboundMessage};
use crate::bus::ChannelType;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SlackConfig {
    pub bot_token: String,
    pub app_token: String,
}

pub struct SlackAdapter {
    name: String,
    config: SlackConfig,
    client: reqwest::Client,
    handler: Mutex<Option<MessageHandler>>,
    running: AtomicBool,
}

impl SlackAdapter {
    pub fn new(name: impl Into<String>, config: SlackConfig) -> Self {
        Self {
            name: name.into(),
            config,
            client: reqwest::Client::new(),
            handler: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    async fn open_socket_url(&self) -> anyhow::Result<String> {
        let resp: Value = self
            .client
            .post("https://slack.com/api/apps.connections.open")
            .bearer_auth(&self.config.app_token)
            .send()
            .await?
            .json()
            .await?;
        resp.get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("apps.connections.open did not return a url"))
    }
}

#[async_trait]
impl ChannelAdapter for SlackAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        ChannelType::SLACK
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.config.bot_token.trim().is_empty() || self.config.app_token.trim().is_empty() {
            warn!(channel = %self.name, "slack adapter missing bot_token/app_token; leaving it stopped");
            return Ok(());
        }
        let Some(handler) = self.handler.lock().ok().and_then(|g| g.clone()) else {
            warn!(channel = %self.name, "slack adapter started with no message handler registered");
            self.running.store(true, Ordering::SeqCst);
            return Ok(());
        };

        let url = match self.open_socket_url().await {
            Ok(url) => url,
            Err(e) => {
                warn!(channel = %self.name, error = %e, "failed to open slack socket-mode connection; leaving it stopped");
                return Ok(());
            }
        };

        let channel_name = self.name.clone();
        let bot_token = self.config.bot_token.clone();
        let client = self.client.clone();
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            let (ws, _) = match tokio_tungstenite::connect_async(url).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "slack socket-mode connect failed");
                    return;
                }
            };
            let (mut write, mut read) = ws.split();

            while let Some(Ok(frame)) = read.next().await {
                let tokio_tungstenite::tungstenite::Message::Text(text) = frame else {
                    continue;
                };
                let Ok(envelope) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };

                if let Some(envelope_id) = envelope.get("envelope_id").and_then(Value::as_str) {
                    let ack = serde_json::json!({ "envelope_id": envelope_id });
                    let _ = write
                        .send(tokio_tungstenite::tungstenite::Message::Text(ack.to_string().into()))
                        .await;
                }

                let Some(event) = envelope.pointer("/payload/event") else {
                    continue;
                };
                if event.get("bot_id").is_some() {
                    continue;
                }
                let (Some(user), Some(text), Some(channel)) = (
                    event.get("user").and_then(Value::as_str),
                    event.get("text").and_then(Value::as_str),
                    event.get("channel").and_then(Value::as_str),
                ) else {
                    continue;
                };

                let inbound = InboundMessage {
                    channel: ChannelType::new(ChannelType::SLACK),
                    channel_name: channel_name.clone(),
                    sender_id: user.to_string(),
                    sender_label: None,
                    text: text.to_string(),
                    thread_id: Some(channel.to_string()),
                    attachments: vec![],
                    timestamp: chrono::Utc::now(),
                    raw: event.clone(),
                };
                let reply = handler(inbound).await;
                let payload = serde_json::json!({ "channel": channel, "text": reply });
                if let Err(e) = client
                    .post("https://slack.com/api/chat.postMessage")
                    .bearer_auth(&bot_token)
                    .json(&payload)
                    .send()
                    .await
                {
                    error!(error = %e, "failed to post slack reply");
                }
            }
            info!(channel = %channel_name, "slack socket-mode connection closed");
        });

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
        let Some(channel) = &msg.thread_id else {
            return false;
        };
        let payload = serde_json::json!({ "channel": channel, "text": msg.text });
        match self
            .client
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(&self.config.bot_token)
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
    async fn start_without_tokens_leaves_adapter_stopped() {
        let adapter = SlackAdapter::new("sl", SlackConfig::default());
        adapter.start().await.unwrap();
        assert!(!adapter.is_running());
    }

    #[tokio::test]
    async fn send_without_channel_fails_closed() {
        let adapter = SlackAdapter::new(
            "sl",
            SlackConfig {
                bot_token: "xoxb-x".into(),
                app_token: "xapp-x".into(),
            },
        );
        adapter.running.store(true, Ordering::SeqCst);
        let msg = OutboundMessage::new(ChannelType::new("slack"), "sl", "hi");
        assert!(!adapter.send(&msg).await);
    }
}
