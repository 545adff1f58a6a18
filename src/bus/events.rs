use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::channel_type::ChannelType;

/// A message as received from a channel adapter, immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: ChannelType,
    pub channel_name: String,
    pub sender_id: String,
    pub sender_label: Option<String>,
    pub text: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// The raw wire payload the adapter received, kept for transforms or
    /// collaborators that need protocol-specific detail the normalized
    /// fields above don't carry.
    #[serde(default)]
    pub raw: Value,
}

impl InboundMessage {
    /// Key grouping this message into a single pairing/sender record:
    /// `"{channel}:{sender_id}"`.
    pub fn sender_key(&self) -> String {
        format!("{}:{}", self.channel, self.sender_id)
    }

    /// Key grouping this message into a single conversational session:
    /// `"{channel}:{channel_name}:{sender_id}"`.
    pub fn route_key(&self) -> String {
        format!("{}:{}:{}", self.channel, self.channel_name, self.sender_id)
    }
}

/// A message to be delivered by a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: ChannelType,
    pub channel_name: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl OutboundMessage {
    pub fn new(channel: ChannelType, channel_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel,
            channel_name: channel_name.into(),
            thread_id: None,
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

/// Structured content carried in an `OutboundMessage.text` when the reply
/// asks to be rendered on a canvas channel rather than as plain chat text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayEnvelope {
    pub content_type: DisplayContentType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayContentType {
    Chart,
    Html,
    Svg,
    Markdown,
    Code,
    Table,
}

impl DisplayEnvelope {
    /// Parses `text` as a `DisplayEnvelope`; returns `None` on anything that
    /// isn't valid envelope JSON rather than raising, per the spec's
    /// "parsing fallbacks store the raw text as a generic item" guidance.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_inbound() -> InboundMessage {
        InboundMessage {
            channel: ChannelType::new("webhook"),
            channel_name: "support".to_string(),
            sender_id: "u1".to_string(),
            sender_label: None,
            text: "hi".to_string(),
            thread_id: None,
            attachments: vec![],
            timestamp: Utc::now(),
            raw: Value::Null,
        }
    }

    #[test]
    fn sender_key_is_channel_and_sender() {
        assert_eq!(sample_inbound().sender_key(), "webhook:u1");
    }

    #[test]
    fn route_key_is_channel_instance_and_sender() {
        assert_eq!(sample_inbound().route_key(), "webhook:support:u1");
    }

    #[test]
    fn display_envelope_parses_well_formed_json() {
        let text = r#"{"content_type":"chart","content":"spec","id":"c1","title":"T"}"#;
        let env = DisplayEnvelope::parse(text).unwrap();
        assert_eq!(env.content_type, DisplayContentType::Chart);
        assert_eq!(env.id.as_deref(), Some("c1"));
    }

    #[test]
    fn display_envelope_parse_rejects_plain_text() {
        assert!(DisplayEnvelope::parse("just chatting").is_none());
    }
}
