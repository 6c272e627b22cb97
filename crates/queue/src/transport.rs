//! Send/receive contracts for the work queues.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::QueueError;

/// Longest delivery delay a queue accepts (the SQS limit).
pub const MAX_DELIVERY_DELAY: Duration = Duration::from_secs(900);

/// One delivery of a queued message. A redelivery carries a new receipt.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub body: String,
    /// Handle for `ack`/`release`, valid for this delivery only.
    pub receipt: String,
    pub sent_at: DateTime<Utc>,
    /// 1 on first delivery.
    pub receive_count: u32,
}

#[async_trait]
pub trait QueueProducer: Send + Sync {
    fn name(&self) -> &str;

    /// Send a body, hidden from receivers for `delay` (clamped to
    /// [`MAX_DELIVERY_DELAY`]). Returns the message id.
    async fn send(&self, body: String, delay: Option<Duration>) -> Result<String, QueueError>;
}

/// Receiving side. Delivery is at-least-once: anything not acked comes back.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Up to `max` visible messages; may long-poll.
    async fn receive(&self, max: u32) -> Result<Vec<Delivery>, QueueError>;

    /// Processing finished; delete the message.
    async fn ack(&self, receipt: &str) -> Result<(), QueueError>;

    /// Processing failed; make the message visible again now.
    async fn release(&self, receipt: &str) -> Result<(), QueueError>;
}

/// Clamp a requested delay to what the queue accepts.
pub fn delivery_delay(queue: &str, requested: Duration) -> Duration {
    if requested > MAX_DELIVERY_DELAY {
        warn!(
            queue,
            requested_secs = requested.as_secs(),
            max_secs = MAX_DELIVERY_DELAY.as_secs(),
            "Delivery delay clamped"
        );
        return MAX_DELIVERY_DELAY;
    }
    requested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_limit_is_kept() {
        assert_eq!(delivery_delay("q", Duration::from_secs(300)), Duration::from_secs(300));
        assert_eq!(delivery_delay("q", MAX_DELIVERY_DELAY), MAX_DELIVERY_DELAY);
    }

    #[test]
    fn test_delay_over_limit_is_clamped() {
        assert_eq!(delivery_delay("q", Duration::from_secs(3600)), MAX_DELIVERY_DELAY);
    }
}
