//! The `canvas` channel type: a display surface, not a chat transport.
//! `send()` broadcasts a frame to every connected viewer over WebSocket.
//! No teacher analog exists for this; the broadcast-iterate-a-copy
//! discipline follows spec §5's "adapter `is_running`/`_chat_clients` sets
//! ... broadcast sends iterate a copy to avoid mutation during iteration."

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::adapter::{ChannelAdapter, MessageHandler};
use crate::bus::events::OutboundMessage;
use crate::bus::ChannelType;

pub struct CanvasAdapter {
    name: String,
    clients: Mutex<Vec<UnboundedSender<String>>>,
    handler: Mutex<Option<MessageHandler>>,
    running: AtomicBool,
}

impl CanvasAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clients: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Registers a newly connected viewer's outbound frame sink.
    pub fn add_client(&self, sink: UnboundedSender<String>) {
        if let Ok(mut clients) = self.clients.lock() {
            clients.push(sink);
        }
    }

    fn broadcast(&self, frame: &str) {
        let Ok(clients) = self.clients.lock() else {
            return;
        };
        // Iterate a copy so a client disconnecting mid-broadcast can't
        // mutate the vector we're walking.
        let snapshot: Vec<_> = clients.clone();
        drop(clients);

        let mut alive = Vec::with_capacity(snapshot.len());
        for client in snapshot {
            if client.send(frame.to_string()).is_ok() {
                alive.push(client);
            }
        }
        if let Ok(mut clients) = self.clients.lock() {
            *clients = alive;
        }
    }
}

#[async_trait]
impl ChannelAdapter for CanvasAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        ChannelType::CANVAS
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut clients) = self.clients.lock() {
            clients.clear();
        }
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> bool {
        if !self.is_running() {
            return false;
        }
        self.broadcast(&msg.text);
        true
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
