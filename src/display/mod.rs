//! Display router: classifies an outbound payload and selects a destination
//! adapter, per spec §4.5. No direct teacher analog exists (the teacher
//! ships no canvas concept); grounded on the teacher's broadcast-over-copy
//! discipline (`channels/canvas.rs` here) for the canvas-state ring, and on
//! spec §6's WebSocket push-frame shape for the admin surface's bridge.

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::events::{DisplayContentType, DisplayEnvelope, OutboundMessage};
use crate::bus::ChannelType;
use crate::channels::set::ChannelSet;

const CANVAS_STATE_CAPACITY: usize = 200;

/// Optional out-of-band hints accompanying an outbound reply's text, mirrors
/// `DisplayEnvelope`'s fields for callers that already know the content type
/// without re-parsing the reply text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMetadata {
    #[serde(default)]
    pub content_type: Option<DisplayContentType>,
    #[serde(default)]
    pub id: Option<String>,
}

/// A canvas-state item, newest-first in `CanvasState`. Mirrors the
/// WebSocket push frame shape from spec §6 so the same struct serializes
/// for both the admin surface's `GET /admin/api/canvas` and the `"update"`
/// frame broadcast to connected viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasItem {
    pub id: String,
    pub content_type: DisplayContentType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

const CANVAS_UPDATES_CAPACITY: usize = 64;

/// In-memory, newest-first ring of the most recent `DisplayEnvelope`s keyed
/// by `id`. Per spec §9, persistence across a daemon restart is out of
/// scope — this state is rebuilt from scratch on every startup. Every
/// `upsert` also fans the item out on `updates`, which the admin surface's
/// `/admin/ws` route subscribes to so connected viewers see pushes live
/// instead of only on next poll.
pub struct CanvasState {
    items: Mutex<VecDeque<CanvasItem>>,
    updates: tokio::sync::broadcast::Sender<CanvasItem>,
}

impl Default for CanvasState {
    fn default() -> Self {
        let (updates, _) = tokio::sync::broadcast::channel(CANVAS_UPDATES_CAPACITY);
        Self {
            items: Mutex::new(VecDeque::new()),
            updates,
        }
    }
}

impl CanvasState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to live canvas-item updates, newest-upsert-first.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CanvasItem> {
        self.updates.subscribe()
    }

    /// Inserts or replaces the item keyed by `item.id`, moving it to the
    /// front (most-recent-first), and broadcasts it to any subscribers.
    pub fn upsert(&self, item: CanvasItem) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.retain(|i| i.id != item.id);
        items.push_front(item.clone());
        while items.len() > CANVAS_STATE_CAPACITY {
            items.pop_back();
        }
        drop(items);
        let _ = self.updates.send(item);
    }

    /// Newest-first snapshot, matching the `{items: [...]}` wire shape from
    /// spec §6.
    pub fn snapshot(&self) -> Vec<CanvasItem> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

pub struct DisplayRouter {
    canvas_state: CanvasState,
}

impl DisplayRouter {
    pub fn new() -> Self {
        Self {
            canvas_state: CanvasState::new(),
        }
    }

    pub fn canvas_state(&self) -> &CanvasState {
        &self.canvas_state
    }

    /// Classifies `(text, metadata)` and sends on exactly the adapter the
    /// selection rule in spec §4.5 names: a `canvas`-typed adapter when the
    /// text parses as a `DisplayEnvelope` or `metadata.content_type` is set
    /// (falling back to the originating adapter if no canvas exists), else
    /// the originating chat adapter. Returns whether the `send` succeeded.
    pub async fn route(
        &self,
        channels: &ChannelSet,
        text: &str,
        metadata: &OutboundMetadata,
        originating_channel_name: &str,
        thread_id: Option<String>,
        attachments: Vec<String>,
    ) -> bool {
        let envelope = DisplayEnvelope::parse(text);
        let is_structured = envelope.is_some() || metadata.content_type.is_some();

        if is_structured {
            let envelope = envelope.unwrap_or_else(|| DisplayEnvelope {
                content_type: metadata.content_type.clone().unwrap_or(DisplayContentType::Markdown),
                content: text.to_string(),
                id: metadata.id.clone(),
                title: None,
            });

            if let Some(id) = envelope.id.clone() {
                self.canvas_state.upsert(CanvasItem {
                    id,
                    content_type: envelope.content_type.clone(),
                    content: envelope.content.clone(),
                    title: envelope.title.clone(),
                });
            }

            if let Some(canvas) = channels.find_canvas() {
                let payload = serde_json::to_string(&envelope).unwrap_or_else(|_| text.to_string());
                let msg = OutboundMessage {
                    channel: ChannelType::new(ChannelType::CANVAS),
                    channel_name: canvas.name().to_string(),
                    thread_id,
                    text: payload,
                    attachments,
                };
                return channels.send(&msg).await;
            }
            // No canvas adapter: fall back to the originating chat adapter
            // with the envelope delivered verbatim as plain text.
        }

        let Some(origin) = channels.find(originating_channel_name) else {
            return false;
        };
        let msg = OutboundMessage {
            channel: ChannelType::new(origin.channel_type()),
            channel_name: origin.name().to_string(),
            thread_id,
            text: text.to_string(),
            attachments,
        };
        channels.send(&msg).await
    }
}

impl Default for DisplayRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a raw JSON value into `OutboundMetadata`, tolerating absent or
/// malformed keys rather than raising — mirrors `DisplayEnvelope::parse`'s
/// fallback behavior.
pub fn metadata_from_value(value: &Value) -> OutboundMetadata {
    serde_json::from_value(value.clone()).unwrap_or_default()
}
