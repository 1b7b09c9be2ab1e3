//! Message bus (C4): a bounded, single-consumer queue that carries
//! `SystemMessage`s from background producers (subagent workers, the cron
//! fire handler) to the driver's detector loop.
//!
//! No persistence: messages queued across a process restart are lost, which
//! is acceptable per scope. Ordering within a single producer is preserved;
//! across producers delivery is first-come-first-served.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    SubagentResult,
    CronResult,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMessage {
    pub message_type: MessageType,
    pub sender_id: String,
    /// Pre-formatted for direct display or injection into the model.
    pub content: String,
    pub metadata: Value,
    pub timestamp: i64,
}

impl SystemMessage {
    pub fn new(message_type: MessageType, sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            message_type,
            sender_id: sender_id.into(),
            content: content.into(),
            metadata: Value::Object(serde_json::Map::new()),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Bounded FIFO queue of `SystemMessage`s. Any number of producers may hold
/// a clone (the sender half is `Clone`); there is exactly one consumer.
pub struct MessageBus {
    tx: mpsc::Sender<SystemMessage>,
    rx: Mutex<mpsc::Receiver<SystemMessage>>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Non-blocking publish. Returns an error if the bus is full rather
    /// than blocking the producer — producers (subagent workers, cron) must
    /// never stall waiting on the driver to drain the queue.
    pub fn publish(&self, msg: SystemMessage) -> anyhow::Result<()> {
        match self.tx.try_send(msg) {
            Ok(()) => {
                debug!("published system message");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("message bus full, dropping message");
                Err(anyhow::anyhow!("message bus is full"))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(anyhow::anyhow!("message bus consumer has shut down")),
        }
    }

    /// Dequeue the next message, waiting up to `timeout`. Only one caller
    /// should ever call this — the driver's detector loop.
    pub async fn consume(&self, timeout: Duration) -> Option<SystemMessage> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_consume_round_trips() {
        let bus = MessageBus::default();
        bus.publish(SystemMessage::new(MessageType::SubagentResult, "subagent:abc", "done"))
            .unwrap();
        let msg = bus.consume(Duration::from_millis(100)).await.unwrap();
        assert_eq!(msg.sender_id, "subagent:abc");
        assert_eq!(msg.message_type, MessageType::SubagentResult);
    }

    #[tokio::test]
    async fn consume_times_out_when_empty() {
        let bus = MessageBus::default();
        let msg = bus.consume(Duration::from_millis(20)).await;
        assert!(msg.is_none());
    }

    #[tokio::test]
    async fn preserves_order_within_one_producer() {
        let bus = MessageBus::default();
        for i in 0..5 {
            bus.publish(SystemMessage::new(MessageType::Other, "p1", format!("msg-{i}")))
                .unwrap();
        }
        for i in 0..5 {
            let msg = bus.consume(Duration::from_millis(100)).await.unwrap();
            assert_eq!(msg.content, format!("msg-{i}"));
        }
    }

    #[tokio::test]
    async fn publish_fails_when_full_instead_of_blocking() {
        let bus = MessageBus::new(1);
        bus.publish(SystemMessage::new(MessageType::Other, "p1", "first")).unwrap();
        let result = bus.publish(SystemMessage::new(MessageType::Other, "p1", "second"));
        assert!(result.is_err());
    }
}
