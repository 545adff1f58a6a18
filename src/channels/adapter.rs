use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::events::{InboundMessage, OutboundMessage};

/// The single inbound handler an adapter delivers messages to. Returns the
/// reply text the daemon wants sent back (the daemon, not the adapter,
/// decides how/whether to actually deliver it).
pub type MessageHandler =
    Arc<dyn Fn(InboundMessage) -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

/// Capability set every channel transport implements. State machine:
/// `Constructed -> Running -> Stopped`, with `start()` on `Stopped`
/// re-entering `Running`. All methods must be safe to call repeatedly
/// (idempotent `start`/`stop`) and must never panic on transport failure —
/// failures are reported through the return value or `is_running`.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The configured instance name (e.g. `"support-telegram"`).
    fn name(&self) -> &str;

    /// The channel type this adapter implements (e.g. `"telegram"`).
    fn channel_type(&self) -> &str;

    /// Acquires transport resources and begins delivering inbound messages.
    /// If a required credential/SDK dependency is missing, logs a warning
    /// and leaves `is_running() == false` rather than failing hard.
    async fn start(&self) -> anyhow::Result<()>;

    /// Releases resources and cancels in-flight deliveries.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Attempts delivery once. `true` on success, `false` on any handled
    /// failure (including "not running") — never raises.
    async fn send(&self, msg: &OutboundMessage) -> bool;

    /// Registers the single inbound handler; a re-registration replaces it.
    fn set_on_message(&self, handler: MessageHandler);

    fn is_running(&self) -> bool;

    /// Optional typing indicator; adapters without one no-op.
    async fn send_typing(&self, _chat_id: &str) {}
}
