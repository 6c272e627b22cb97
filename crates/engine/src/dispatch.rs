//! Routes queue messages to their handlers and runs consumer loops.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use powermgmt_core::{DeferredCheck, MaintenanceEvent, PowerAction, SubscriptionCheck};
use powermgmt_queue::{decode, Delivery, QueueConsumer};

use crate::deferred::DeferredChecker;
use crate::error::{EngineError, Result};
use crate::maintenance_events::MaintenanceIntake;
use crate::scan::SubscriptionScanner;
use crate::state_machine::PowerActionHandler;

/// Which handler a queue feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    SubscriptionCheck,
    PowerAction,
    DeferredCheck,
    MaintenanceEvent,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::SubscriptionCheck => "subscription check",
            MessageKind::PowerAction => "power action",
            MessageKind::DeferredCheck => "deferred check",
            MessageKind::MaintenanceEvent => "maintenance event",
        }
    }
}

pub struct Dispatcher {
    scanner: SubscriptionScanner,
    actions: PowerActionHandler,
    checker: Arc<DeferredChecker>,
    maintenance: MaintenanceIntake,
}

impl Dispatcher {
    pub fn new(
        scanner: SubscriptionScanner,
        actions: PowerActionHandler,
        checker: Arc<DeferredChecker>,
        maintenance: MaintenanceIntake,
    ) -> Self {
        Self {
            scanner,
            actions,
            checker,
            maintenance,
        }
    }

    pub async fn dispatch(&self, kind: MessageKind, msg: &Delivery) -> Result<()> {
        debug!(kind = kind.as_str(), message_id = %msg.message_id, attempt = msg.receive_count, "Dispatching message");
        match kind {
            MessageKind::SubscriptionCheck => {
                let check: SubscriptionCheck = decode_as(kind, msg)?;
                self.scanner.scan(&check, &msg.message_id).await?;
            }
            MessageKind::PowerAction => {
                let action: PowerAction = decode_as(kind, msg)?;
                self.actions.handle(&action).await?;
            }
            MessageKind::DeferredCheck => {
                let check: DeferredCheck = decode_as(kind, msg)?;
                self.checker.check(check).await?;
            }
            MessageKind::MaintenanceEvent => {
                let event: MaintenanceEvent = decode_as(kind, msg)?;
                self.maintenance.handle(&event).await?;
            }
        }
        Ok(())
    }

    /// Process every message currently visible on `consumer`, acking
    /// successes and releasing failures. Returns the number handled
    /// successfully.
    pub async fn drain(&self, kind: MessageKind, consumer: &dyn QueueConsumer, batch_size: u32) -> Result<usize> {
        let mut handled = 0;
        loop {
            let batch = consumer.receive(batch_size).await?;
            if batch.is_empty() {
                return Ok(handled);
            }
            let mut progressed = false;
            for msg in &batch {
                if self.process(kind, consumer, msg).await {
                    handled += 1;
                    progressed = true;
                }
            }
            if !progressed {
                return Ok(handled);
            }
        }
    }

    /// Handle one message and settle it on the queue. Returns whether the
    /// handler succeeded.
    async fn process(&self, kind: MessageKind, consumer: &dyn QueueConsumer, msg: &Delivery) -> bool {
        match self.dispatch(kind, msg).await {
            Ok(()) => {
                if let Err(e) = consumer.ack(&msg.receipt).await {
                    warn!(message_id = %msg.message_id, error = %e, "Failed to ack message");
                }
                true
            }
            Err(e) => {
                error!(kind = kind.as_str(), message_id = %msg.message_id, error = %e, "Message handling failed");
                if let Err(e) = consumer.release(&msg.receipt).await {
                    warn!(message_id = %msg.message_id, error = %e, "Failed to release message");
                }
                false
            }
        }
    }
}

fn decode_as<T: DeserializeOwned>(kind: MessageKind, msg: &Delivery) -> Result<T> {
    decode(msg).map_err(|e| EngineError::malformed(kind.as_str(), e.to_string()))
}

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub batch_size: u32,
    /// Pause after an empty poll.
    pub idle_wait: Duration,
    /// Ceiling for the backoff after receive errors.
    pub max_backoff: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            idle_wait: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Poll `consumer` until `shutdown` flips to true.
pub async fn run_consumer(
    kind: MessageKind,
    consumer: Arc<dyn QueueConsumer>,
    dispatcher: Arc<Dispatcher>,
    opts: ConsumerOptions,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(kind = kind.as_str(), batch_size = opts.batch_size, "Queue consumer started");
    let mut backoff = opts.idle_wait;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let wait = match consumer.receive(opts.batch_size).await {
            Ok(batch) => {
                backoff = opts.idle_wait;
                let empty = batch.is_empty();
                for msg in &batch {
                    dispatcher.process(kind, consumer.as_ref(), msg).await;
                }
                if empty {
                    opts.idle_wait
                } else {
                    Duration::ZERO
                }
            }
            Err(e) => {
                warn!(kind = kind.as_str(), error = %e, "Queue poll error, retrying in {:?}", backoff);
                let wait = backoff;
                backoff = (backoff * 2).min(opts.max_backoff);
                wait
            }
        };

        if !wait.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    info!(kind = kind.as_str(), "Queue consumer stopped");
}
