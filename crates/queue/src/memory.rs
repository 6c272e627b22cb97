//! In-process queue honouring delivery delays against an injected clock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use powermgmt_core::Clock;

use crate::error::QueueError;
use crate::transport::{delivery_delay, Delivery, QueueConsumer, QueueProducer};

#[derive(Debug, Clone)]
struct Stored {
    id: String,
    body: String,
    sent_at: DateTime<Utc>,
    visible_at: DateTime<Utc>,
    /// Receipt handle of the current delivery, while in flight.
    receipt: Option<String>,
    attempts: u32,
}

/// A message waiting in an [`InMemoryQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub body: String,
    pub visible_at: DateTime<Utc>,
}

pub struct InMemoryQueue {
    name: String,
    clock: Arc<dyn Clock>,
    messages: Mutex<VecDeque<Stored>>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            clock,
            messages: Mutex::new(VecDeque::new()),
        }
    }

    /// Messages not currently in flight, visible or not.
    pub async fn pending(&self) -> Vec<PendingMessage> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.receipt.is_none())
            .map(|m| PendingMessage {
                body: m.body.clone(),
                visible_at: m.visible_at,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    /// Remove and return every stored message body, in send order.
    pub async fn drain(&self) -> Vec<String> {
        self.messages.lock().await.drain(..).map(|m| m.body).collect()
    }
}

#[async_trait]
impl QueueProducer for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: String, delay: Option<Duration>) -> Result<String, QueueError> {
        let now = self.clock.now();
        let delay = delay
            .map(|d| {
                chrono::Duration::from_std(delivery_delay(&self.name, d)).map_err(|e| QueueError::Send(e.to_string()))
            })
            .transpose()?
            .unwrap_or_else(chrono::Duration::zero);
        let id = Uuid::new_v4().to_string();

        debug!(queue = %self.name, message_id = %id, delay_secs = delay.num_seconds(), "Enqueued message");

        self.messages.lock().await.push_back(Stored {
            id: id.clone(),
            body,
            sent_at: now,
            visible_at: now + delay,
            receipt: None,
            attempts: 0,
        });
        Ok(id)
    }
}

#[async_trait]
impl QueueConsumer for InMemoryQueue {
    async fn receive(&self, max: u32) -> Result<Vec<Delivery>, QueueError> {
        let now = self.clock.now();
        let mut messages = self.messages.lock().await;
        let mut batch = Vec::new();

        for stored in messages.iter_mut() {
            if batch.len() >= max as usize {
                break;
            }
            if stored.receipt.is_some() || stored.visible_at > now {
                continue;
            }
            let receipt = Uuid::new_v4().to_string();
            stored.receipt = Some(receipt.clone());
            stored.attempts += 1;
            batch.push(Delivery {
                message_id: stored.id.clone(),
                body: stored.body.clone(),
                receipt,
                sent_at: stored.sent_at,
                receive_count: stored.attempts,
            });
        }

        Ok(batch)
    }

    async fn ack(&self, receipt: &str) -> Result<(), QueueError> {
        let mut messages = self.messages.lock().await;
        let pos = messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;
        messages.remove(pos);
        Ok(())
    }

    async fn release(&self, receipt: &str) -> Result<(), QueueError> {
        let now = self.clock.now();
        let mut messages = self.messages.lock().await;
        let stored = messages
            .iter_mut()
            .find(|m| m.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;
        stored.receipt = None;
        stored.visible_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use powermgmt_core::FixedClock;

    fn queue() -> (Arc<FixedClock>, InMemoryQueue) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 13, 5, 0, 0).unwrap()));
        let queue = InMemoryQueue::new("test", clock.clone());
        (clock, queue)
    }

    #[tokio::test]
    async fn delayed_messages_wait_for_the_clock() {
        let (clock, queue) = queue();
        queue.send("later".into(), Some(Duration::from_secs(60))).await.unwrap();
        queue.send("now".into(), None).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "now");

        clock.advance(chrono::Duration::seconds(60));
        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "later");
    }

    #[tokio::test]
    async fn ack_removes_and_release_redelivers() {
        let (_clock, queue) = queue();
        queue.send("a".into(), None).await.unwrap();
        queue.send("b".into(), None).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        // In-flight messages are not redelivered.
        assert!(queue.receive(10).await.unwrap().is_empty());

        queue.ack(&batch[0].receipt).await.unwrap();
        queue.release(&batch[1].receipt).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "b");
        assert_eq!(batch[0].receive_count, 2);
    }

    #[tokio::test]
    async fn unknown_receipts_are_errors() {
        let (_clock, queue) = queue();
        assert!(matches!(
            queue.ack("nope").await,
            Err(QueueError::UnknownReceipt(_))
        ));
    }

    #[tokio::test]
    async fn pending_reports_visibility() {
        let (clock, queue) = queue();
        queue.send("x".into(), Some(Duration::from_secs(30))).await.unwrap();
        let pending = queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].visible_at, clock.now() + chrono::Duration::seconds(30));
    }

    #[tokio::test]
    async fn batch_size_is_respected() {
        let (_clock, queue) = queue();
        for i in 0..5 {
            queue.send(format!("m{i}"), None).await.unwrap();
        }
        assert_eq!(queue.receive(2).await.unwrap().len(), 2);
        assert_eq!(queue.len().await, 5);
    }

    #[tokio::test]
    async fn delays_past_the_queue_limit_are_clamped() {
        let (clock, queue) = queue();
        queue.send("x".into(), Some(Duration::from_secs(3600))).await.unwrap();
        let pending = queue.pending().await;
        assert_eq!(pending[0].visible_at, clock.now() + chrono::Duration::seconds(900));
    }
}
