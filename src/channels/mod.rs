pub mod adapter;
pub mod canvas;
#[cfg(feature = "channel-discord")]
pub mod discord;
pub mod set;
#[cfg(feature = "channel-slack")]
pub mod slack;
#[cfg(feature = "channel-telegram")]
pub mod telegram;
pub mod utils;
pub mod webhook;
pub mod whatsapp;

use std::collections::HashMap;

use serde_json::Value;

use crate::registry::ChannelFactory;
use adapter::ChannelAdapter;

/// Populates `table` with the compile-time built-in adapter factories.
/// Plugin entries registered via `registry::register_factory` override
/// these on name collision at resolve time.
pub fn register_builtins(table: &mut HashMap<String, ChannelFactory>) {
    table.insert(
        "webhook".to_string(),
        std::sync::Arc::new(|name: &str, cfg: &Value| {
            let config = serde_json::from_value(cfg.clone()).unwrap_or_default();
            Ok(Box::new(webhook::WebhookAdapter::new(name, config)) as Box<dyn ChannelAdapter>)
        }),
    );

    table.insert(
        "canvas".to_string(),
        std::sync::Arc::new(|name: &str, _cfg: &Value| {
            Ok(Box::new(canvas::CanvasAdapter::new(name)) as Box<dyn ChannelAdapter>)
        }),
    );

    table.insert(
        "whatsapp".to_string(),
        std::sync::Arc::new(|name: &str, cfg: &Value| {
            let config = serde_json::from_value(cfg.clone()).unwrap_or_default();
            Ok(Box::new(whatsapp::WhatsAppAdapter::new(name, config)) as Box<dyn ChannelAdapter>)
        }),
    );

    #[cfg(feature = "channel-telegram")]
    table.insert(
        "telegram".to_string(),
        std::sync::Arc::new(|name: &str, cfg: &Value| {
            let config = serde_json::from_value(cfg.clone()).unwrap_or_default();
            Ok(Box::new(telegram::TelegramAdapter::new(name, config)) as Box<dyn ChannelAdapter>)
        }),
    );

    #[cfg(feature = "channel-discord")]
    table.insert(
        "discord".to_string(),
        std::sync::Arc::new(|name: &str, cfg: &Value| {
            let config = serde_json::from_value(cfg.clone()).unwrap_or_default();
            Ok(Box::new(discord::DiscordAdapter::new(name, config)) as Box<dyn ChannelAdapter>)
        }),
    );

    #[cfg(feature = "channel-slack")]
    table.insert(
        "slack".to_string(),
        std::sync::Arc::new(|name: &str, cfg: &Value| {
            let config = serde_json::from_value(cfg.clone()).unwrap_or_default();
            Ok(Box::new(slack::SlackAdapter::new(name, config)) as Box<dyn ChannelAdapter>)
        }),
    );
}
