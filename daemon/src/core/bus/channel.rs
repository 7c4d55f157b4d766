use async_trait::async_trait;
use dashmap::DashMap;
use log::trace;
use tokio::sync::mpsc;

use crate::core::{bus::MessageBus, error::LedgerError};

// In-process bus delivering per-binding FIFO over tokio channels. Used
// by the embedded consumer and by tests; a broker-backed producer
// implements the same trait in the hosted deployment.
#[derive(Default)]
pub struct ChannelBus {
    bindings: DashMap<(String, String), mpsc::UnboundedSender<Vec<u8>>>,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    // Bind a consumer to a (topic, routing key) pair. Publishing to an
    // unbound pair fails, which is what drives the inline fallback.
    pub fn bind(&self, topic: &str, routing_key: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.bindings.insert((topic.to_string(), routing_key.to_string()), sender);
        receiver
    }

    pub fn unbind(&self, topic: &str, routing_key: &str) {
        self.bindings.remove(&(topic.to_string(), routing_key.to_string()));
    }
}

#[async_trait]
impl MessageBus for ChannelBus {
    async fn publish(&self, topic: &str, routing_key: &str, payload: &[u8]) -> Result<(), LedgerError> {
        let binding = (topic.to_string(), routing_key.to_string());
        let sender = self
            .bindings
            .get(&binding)
            .ok_or_else(|| LedgerError::Bus(format!("no binding for {topic}/{routing_key}")))?;
        sender
            .send(payload.to_vec())
            .map_err(|_| LedgerError::Bus(format!("consumer for {topic}/{routing_key} is gone")))?;
        trace!("published {} bytes to {}/{}", payload.len(), topic, routing_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_the_bound_consumer() {
        let bus = ChannelBus::new();
        let mut receiver = bus.bind("audit", "events");
        bus.publish("audit", "events", b"payload").await.unwrap();
        assert_eq!(receiver.recv().await.unwrap(), b"payload".to_vec());
    }

    #[tokio::test]
    async fn publish_without_binding_fails() {
        let bus = ChannelBus::new();
        let err = bus.publish("audit", "events", b"payload").await.unwrap_err();
        assert!(matches!(err, LedgerError::Bus(_)));
    }
}
