//! Typed senders for the workflow's queues.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use powermgmt_core::{DeferredCheck, PowerAction, SubscriptionCheck};
use powermgmt_queue::{encode, QueueProducer};

use crate::error::Result;

#[derive(Clone)]
pub struct Outbox {
    subscription_checks: Arc<dyn QueueProducer>,
    power_actions: Arc<dyn QueueProducer>,
    deferred_checks: Arc<dyn QueueProducer>,
}

impl Outbox {
    pub fn new(
        subscription_checks: Arc<dyn QueueProducer>,
        power_actions: Arc<dyn QueueProducer>,
        deferred_checks: Arc<dyn QueueProducer>,
    ) -> Self {
        Self {
            subscription_checks,
            power_actions,
            deferred_checks,
        }
    }

    pub async fn send_subscription_check(&self, check: &SubscriptionCheck) -> Result<String> {
        debug!(queue = %self.subscription_checks.name(), subscription = %check.id, "Sending subscription check");
        Ok(self.subscription_checks.send(encode(check)?, None).await?)
    }

    pub async fn send_power_action(&self, action: &PowerAction) -> Result<String> {
        debug!(
            queue = %self.power_actions.name(),
            resource_id = %action.id,
            action = %action.action,
            "Sending power action"
        );
        Ok(self.power_actions.send(encode(action)?, None).await?)
    }

    /// Send a deferred check, hidden from consumers for `delay`.
    pub async fn send_deferred_check(&self, check: &DeferredCheck, delay: Duration) -> Result<String> {
        debug!(
            queue = %self.deferred_checks.name(),
            resource_id = %check.action.id,
            wait_retries = check.wait_retries,
            delay_secs = delay.as_secs(),
            "Sending deferred check"
        );
        Ok(self.deferred_checks.send(encode(check)?, Some(delay)).await?)
    }
}
