mod channel;

pub use channel::ChannelBus;

use async_trait::async_trait;

use crate::core::error::LedgerError;

// Publish-only producer. Ordering is assumed per (topic, routing key)
// by callers but not promised here; delivery is at-least-once and every
// consumer must tolerate replays.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn publish(&self, topic: &str, routing_key: &str, payload: &[u8]) -> Result<(), LedgerError>;
}
