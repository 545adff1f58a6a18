use serde::{Deserialize, Serialize};
use std::fmt;

/// An open-ended channel-type carrier. Builtin kinds are canonical constants;
/// a plugin is free to register any other string, and lookups must never
/// fail on an unrecognized value — only `registry::resolve` can reject one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelType(String);

impl ChannelType {
    pub const WEBHOOK: &'static str = "webhook";
    pub const TELEGRAM: &'static str = "telegram";
    pub const DISCORD: &'static str = "discord";
    pub const SLACK: &'static str = "slack";
    pub const WHATSAPP: &'static str = "whatsapp";
    pub const CANVAS: &'static str = "canvas";
    /// Internal carrier for synthesized heartbeat messages (see
    /// `cron::heartbeat::synthesize_heartbeat_message`) — never a configured
    /// channel instance, so it never goes through the registry.
    pub const HEARTBEAT: &'static str = "heartbeat";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_canvas(&self) -> bool {
        self.0 == Self::CANVAS
    }

    /// True for the synthetic channel carrying heartbeat turns, which skip
    /// the pairing/auth gate entirely (spec §4.6: "allowing the agent
    /// backend to run scheduled self-initiated turns").
    pub fn is_heartbeat(&self) -> bool {
        self.0 == Self::HEARTBEAT
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChannelType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<ChannelType> for String {
    fn from(value: ChannelType) -> Self {
        value.0
    }
}
