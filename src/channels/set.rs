//! Owns the configured adapter instances. Grounded on the teacher's
//! `channels::manager::ChannelManager`: start-all-with-rollback,
//! stop-all-best-effort, and retry-with-linear-backoff delivery — adapted
//! to resolve adapters through the registry instead of `#[cfg(feature)]`
//! construction blocks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::adapter::ChannelAdapter;
use crate::bus::events::OutboundMessage;

const SEND_MAX_ATTEMPTS: u32 = 3;

pub struct ChannelSet {
    adapters: Vec<Arc<dyn ChannelAdapter>>,
}

impl ChannelSet {
    pub fn new(adapters: Vec<Arc<dyn ChannelAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn adapters(&self) -> &[Arc<dyn ChannelAdapter>] {
        &self.adapters
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn ChannelAdapter>> {
        self.adapters.iter().find(|a| a.name() == name)
    }

    /// Returns the first adapter whose channel type is `canvas`, per the
    /// display router's selection rule.
    pub fn find_canvas(&self) -> Option<&Arc<dyn ChannelAdapter>> {
        self.adapters.iter().find(|a| a.channel_type() == "canvas")
    }

    /// Starts every adapter. An `AdapterStartFailure` is logged and the
    /// adapter retained (not running) rather than aborting the whole set —
    /// per spec §7, startup continues past a bad channel instance.
    pub async fn start_all(&self) {
        for adapter in &self.adapters {
            if let Err(e) = adapter.start().await {
                warn!(channel = adapter.name(), error = %e, "adapter failed to start; leaving it stopped");
            } else {
                info!(channel = adapter.name(), "adapter started");
            }
        }
    }

    pub async fn stop_all(&self) {
        for adapter in &self.adapters {
            if let Err(e) = adapter.stop().await {
                error!(channel = adapter.name(), error = %e, "adapter failed to stop cleanly");
            }
        }
    }

    /// Sends `msg` on the adapter named `msg.channel_name`, retrying up to
    /// `SEND_MAX_ATTEMPTS` times with linear backoff between attempts.
    /// Returns `false` if no adapter matches or every attempt is refused.
    pub async fn send(&self, msg: &OutboundMessage) -> bool {
        let Some(adapter) = self.find(&msg.channel_name) else {
            warn!(channel = %msg.channel_name, "no adapter registered for outbound send");
            return false;
        };

        for attempt in 1..=SEND_MAX_ATTEMPTS {
            if adapter.send(msg).await {
                return true;
            }
            if attempt < SEND_MAX_ATTEMPTS {
                warn!(channel = adapter.name(), attempt, "send failed, retrying");
                tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
            }
        }
        error!(channel = adapter.name(), "send exhausted all retries");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::events::OutboundMessage;
    use crate::channels::adapter::MessageHandler;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockAdapter {
        name: String,
        fail_count: Arc<AtomicUsize>,
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChannelAdapter for MockAdapter {
        fn name(&self) -> &str {
            &self.name
        }
        fn channel_type(&self) -> &str {
            "mock"
        }
        async fn start(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn send(&self, _msg: &OutboundMessage) -> bool {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_count.load(Ordering::SeqCst) > 0 {
                self.fail_count.fetch_sub(1, Ordering::SeqCst);
                false
            } else {
                true
            }
        }
        fn set_on_message(&self, _handler: MessageHandler) {}
        fn is_running(&self) -> bool {
            true
        }
    }

    fn msg(channel_name: &str) -> OutboundMessage {
        OutboundMessage::new(crate::bus::ChannelType::new("mock"), channel_name, "hi")
    }

    #[tokio::test]
    async fn send_with_no_matching_channel_returns_false() {
        let set = ChannelSet::new(vec![]);
        assert!(!set.send(&msg("ghost")).await);
    }

    #[tokio::test]
    async fn send_succeeds_on_matching_channel() {
        let adapter = Arc::new(MockAdapter {
            name: "a".into(),
            fail_count: Arc::new(AtomicUsize::new(0)),
            attempts: Arc::new(AtomicUsize::new(0)),
        });
        let set = ChannelSet::new(vec![adapter.clone()]);
        assert!(set.send(&msg("a")).await);
        assert_eq!(adapter.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_retries_then_succeeds() {
        let adapter = Arc::new(MockAdapter {
            name: "a".into(),
            fail_count: Arc::new(AtomicUsize::new(2)),
            attempts: Arc::new(AtomicUsize::new(0)),
        });
        let set = ChannelSet::new(vec![adapter.clone()]);
        assert!(set.send(&msg("a")).await);
        assert_eq!(adapter.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn send_exhausts_retries_and_fails() {
        let adapter = Arc::new(MockAdapter {
            name: "a".into(),
            fail_count: Arc::new(AtomicUsize::new(99)),
            attempts: Arc::new(AtomicUsize::new(0)),
        });
        let set = ChannelSet::new(vec![adapter.clone()]);
        assert!(!set.send(&msg("a")).await);
        assert_eq!(adapter.attempts.load(Ordering::SeqCst), SEND_MAX_ATTEMPTS as usize);
    }
}
