//! Discord adapter via `serenity`. Grounded on the teacher's
//! `channels::discord`, trimmed to plain message-create events — slash
//! commands and embeds are a wire-format detail out of scope here.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serenity::all::{ChannelId, GatewayIntents};
use serenity::async_trait as serenity_async_trait;
use serenity::client::{Client, Context, EventHandler};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use tracing::{error, info, warn};

use super::adapter::{ChannelAdapter, MessageHandler};
use crate::bus::events::{InboundMessage, OutboundMessage};
use crate::bus::ChannelType;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct DiscordConfig {
    pub token: String,
}

struct Handler {
    channel_name: String,
    handler: MessageHandler,
}

#[serenity_async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(bot = %ready.user.name, "discord adapter connected");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || msg.content.trim().is_empty() {
            return;
        }
        let inbound = InboundMessage {
            channel: ChannelType::new(ChannelType::DISCORD),
            channel_name: self.channel_name.clone(),
            sender_id: msg.author.id.to_string(),
            sender_label: Some(msg.author.name.clone()),
            text: msg.content.clone(),
            thread_id: Some(msg.channel_id.to_string()),
            attachments: msg.attachments.iter().map(|a| a.url.clone()).collect(),
            timestamp: chrono::Utc::now(),
            raw: serde_json::json!({ "message_id": msg.id.to_string() }),
        };
        let reply = (self.handler)(inbound).await;
        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            error!(error = %e, "failed to send discord reply");
        }
    }
}

pub struct DiscordAdapter {
    name: String,
    config: DiscordConfig,
    handler: Mutex<Option<MessageHandler>>,
    running: AtomicBool,
}

impl DiscordAdapter {
    pub fn new(name: impl Into<String>, config: DiscordConfig) -> Self {
        Self {
            name: name.into(),
            config,
            handler: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ChannelAdapter for DiscordAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        ChannelType::DISCORD
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.config.token.trim().is_empty() {
            warn!(channel = %self.name, "discord adapter has no bot token configured; leaving it stopped");
            return Ok(());
        }
        let Some(handler) = self.handler.lock().ok().and_then(|g| g.clone()) else {
            warn!(channel = %self.name, "discord adapter started with no message handler registered");
            self.running.store(true, Ordering::SeqCst);
            return Ok(());
        };

        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;
        let event_handler = Handler {
            channel_name: self.name.clone(),
            handler,
        };
        let token = self.config.token.clone();
        self.running.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            match Client::builder(&token, intents).event_handler(event_handler).await {
                Ok(mut client) => {
                    if let Err(e) = client.start().await {
                        error!(error = %e, "discord client exited with error");
                    }
                }
                Err(e) => error!(error = %e, "failed to build discord client"),
            }
        });

        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> bool {
        if !self.is_running() || self.config.token.trim().is_empty() {
            return false;
        }
        let Some(thread_id) = &msg.thread_id else {
            return false;
        };
        let Ok(channel_id) = thread_id.parse::<u64>() else {
            return false;
        };
        let http = serenity::http::Http::new(&self.config.token);
        ChannelId::new(channel_id)
            .say(&http, &msg.text)
            .await
            .is_ok()
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
    async fn start_without_token_leaves_adapter_stopped() {
        let adapter = DiscordAdapter::new("dc", DiscordConfig::default());
        adapter.start().await.unwrap();
        assert!(!adapter.is_running());
    }

    #[tokio::test]
    async fn send_without_thread_id_fails_closed() {
        let adapter = DiscordAdapter::new(
            "dc",
            DiscordConfig {
                token: "fake-token".into(),
            },
        );
        adapter.running.store(true, Ordering::SeqCst);
        let msg = OutboundMessage::new(ChannelType::new("discord"), "dc", "hi");
        assert!(!adapter.send(&msg).await);
    }
}
