//! Timer fan-out: one subscription check per active subscription in scope.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tracing::{debug, info};

use powermgmt_core::config::TriggerConfig;
use powermgmt_core::{Subscription, SubscriptionCheck};

use crate::error::Result;
use crate::memory::InMemoryTickStore;
use crate::outbox::Outbox;
use crate::provider::{SubscriptionDirectory, TickStore};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Subscription(String),
    ManagementGroup(String),
}

impl Scope {
    /// Scopes for a timer tick. Subscription scopes win when both are set.
    pub fn from_config(cfg: &TriggerConfig) -> Vec<Scope> {
        if cfg.subscription_scopes.is_empty() {
            cfg.management_group_scopes
                .iter()
                .cloned()
                .map(Scope::ManagementGroup)
                .collect()
        } else {
            cfg.subscription_scopes
                .iter()
                .cloned()
                .map(Scope::Subscription)
                .collect()
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Subscription(id) => write!(f, "subscription {id}"),
            Scope::ManagementGroup(id) => write!(f, "management group {id}"),
        }
    }
}

/// The timer slot at or before `now` for a trigger firing every
/// `interval_minutes`.
pub fn tick_at_or_before(now: DateTime<Utc>, interval_minutes: u32) -> DateTime<Utc> {
    let interval = TimeDelta::minutes(i64::from(interval_minutes.max(1)));
    now.duration_trunc(interval).unwrap_or(now)
}

pub struct SubscriptionTrigger {
    directory: Arc<dyn SubscriptionDirectory>,
    outbox: Outbox,
    retry: RetryPolicy,
    ticks: Arc<dyn TickStore>,
}

impl SubscriptionTrigger {
    pub fn new(directory: Arc<dyn SubscriptionDirectory>, outbox: Outbox, retry: RetryPolicy) -> Self {
        Self {
            directory,
            outbox,
            retry,
            ticks: Arc::new(InMemoryTickStore::default()),
        }
    }

    pub fn with_tick_store(mut self, ticks: Arc<dyn TickStore>) -> Self {
        self.ticks = ticks;
        self
    }

    /// Enqueue a check for every active subscription in `scope`. Returns the
    /// subscriptions enqueued.
    pub async fn enqueue_subscription_checks(
        &self,
        scope: &Scope,
        last_check: Option<DateTime<Utc>>,
    ) -> Result<Vec<Subscription>> {
        let subs: Vec<Subscription> = match scope {
            Scope::Subscription(id) => self
                .retry
                .run("get_subscription", || self.directory.get_subscription(id))
                .await?
                .into_iter()
                .collect(),
            Scope::ManagementGroup(id) => {
                self.retry
                    .run("subscriptions_in_management_group", || {
                        self.directory.subscriptions_in_management_group(id)
                    })
                    .await?
            }
        };

        let active: Vec<Subscription> = subs.into_iter().filter(Subscription::is_active).collect();
        for sub in &active {
            let check = SubscriptionCheck::for_subscription(sub, last_check);
            info!(subscription = %sub.id, name = %sub.display_name, "Enqueuing subscription check");
            self.outbox.send_subscription_check(&check).await?;
        }
        Ok(active)
    }

    /// Fan out over the configured scopes. The last recorded tick is passed on
    /// as the last check time, falling back to the previous timer slot on a
    /// first run. `now` is recorded once every scope has been enqueued.
    pub async fn on_timer(&self, cfg: &TriggerConfig, now: DateTime<Utc>) -> Result<usize> {
        let last_check = match self.ticks.last_tick().await? {
            Some(previous) if previous < now => previous,
            _ => {
                debug!("No earlier tick recorded, using the previous timer slot");
                tick_at_or_before(now, cfg.interval_minutes) - TimeDelta::minutes(i64::from(cfg.interval_minutes.max(1)))
            }
        };

        let mut total = 0;
        for scope in Scope::from_config(cfg) {
            let subs = self.enqueue_subscription_checks(&scope, Some(last_check)).await?;
            info!(
                scope = %scope,
                interval_minutes = cfg.interval_minutes,
                last_check = %last_check,
                subscriptions = subs.len(),
                "Timer trigger fired"
            );
            total += subs.len();
        }
        self.ticks.record_tick(now).await?;
        Ok(total)
    }
}
