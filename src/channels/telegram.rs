//! Telegram Bot API adapter. Grounded on the teacher's
//! `channels::telegram::TelegramChannel`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::MessageKind;
use tracing::{error, info, warn};

use super::adapter::{ChannelAdapter, MessageHandler};
use crate::bus::events::{InboundMessage, OutboundMessage};
use crate::bus::ChannelType;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TelegramConfig {
    pub token: String,
}

pub struct TelegramAdapter {
    name: String,
    config: TelegramConfig,
    handler: Mutex<Option<MessageHandler>>,
    running: AtomicBool,
}

impl TelegramAdapter {
    pub fn new(name: impl Into<String>, config: TelegramConfig) -> Self {
        Self {
            name: name.into(),
            config,
            handler: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        ChannelType::TELEGRAM
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.config.token.trim().is_empty() {
            warn!(channel = %self.name, "telegram adapter has no bot token configured; leaving it stopped");
            return Ok(());
        }

        let bot = Bot::new(self.config.token.clone());
        let channel_name = self.name.clone();
        let handler_slot = self.handler.lock().ok().and_then(|g| g.clone());

        let Some(handler) = handler_slot else {
            warn!(channel = %self.name, "telegram adapter started with no message handler registered");
            self.running.store(true, Ordering::SeqCst);
            return Ok(());
        };

        self.running.store(true, Ordering::SeqCst);
        let dispatch_bot = bot.clone();
        tokio::spawn(async move {
            let handler_update = Update::filter_message().endpoint(move |msg: Message| {
                let handler = handler.clone();
                let channel_name = channel_name.clone();
                let bot = dispatch_bot.clone();
                async move {
                    let text = match &msg.kind {
                        MessageKind::Common(common) => common.text().map(str::to_string),
                        _ => None,
                    };
                    let Some(text) = text else {
                        return Ok(());
                    };
                    let Some(from) = msg.from.as_ref() else {
                        return Ok(());
                    };

                    let inbound = InboundMessage {
                        channel: ChannelType::new(ChannelType::TELEGRAM),
                        channel_name: channel_name.clone(),
                        sender_id: from.id.0.to_string(),
                        sender_label: from.username.clone(),
                        text,
                        thread_id: None,
                        attachments: vec![],
                        timestamp: chrono::Utc::now(),
                        raw: serde_json::to_value(&msg).unwrap_or(serde_json::Value::Null),
                    };
                    let reply = handler(inbound).await;
                    if let Err(e) = bot.send_message(msg.chat.id, reply).await {
                        error!(error = %e, "failed to send telegram reply");
                    }
                    respond(())
                }
            });

            Dispatcher::builder(bot, handler_update).build().dispatch().await;
        });

        info!(channel = %self.name, "telegram adapter started");
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
            warn!(channel = %self.name, "telegram send requires a chat id in thread_id");
            return false;
        };
        let bot = Bot::new(self.config.token.clone());
        let Ok(chat_id) = thread_id.parse::<i64>() else {
            return false;
        };
        bot.send_message(ChatId(chat_id), &msg.text).await.is_ok()
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
        let adapter = TelegramAdapter::new("tg", TelegramConfig::default());
        adapter.start().await.unwrap();
        assert!(!adapter.is_running());
    }

    #[tokio::test]
    async fn send_without_thread_id_fails_closed() {
        let adapter = TelegramAdapter::new(
            "tg",
            TelegramConfig {
                token: "123:ABC".into(),
            },
        );
        adapter.running.store(true, Ordering::SeqCst);
        let msg = OutboundMessage::new(ChannelType::new("telegram"), "tg", "hi");
        assert!(!adapter.send(&msg).await);
    }
}
