//! Fixtures shared by the unit tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use powermgmt_alerts::AlertRule;
use powermgmt_core::{Config, DeferredCheck, FixedClock, ResourceKind, ResourceState, Subscription};
use powermgmt_queue::{decode, InMemoryQueue, QueueConsumer};
use powermgmt_schedule::NoHolidays;

use crate::engine::{Collaborators, Engine};
use crate::memory::{InMemoryAlerts, InMemoryDirectory, InMemoryFactory, InMemoryFleet, InMemoryMaintenanceRuns};
use crate::outbox::Outbox;

pub const SUB: &str = "sub-1";
pub const VM: &str = "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm-01";
pub const PSQL: &str =
    "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL/flexibleServers/db-01";
pub const AGW: &str =
    "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Network/applicationGateways/agw-01";

/// Monday 2025-01-13 18:02 in Pacific/Auckland.
pub fn monday_evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 13, 5, 2, 0).unwrap()
}

pub fn test_config() -> Config {
    let mut config = Config::from_lookup(&|_: &str| None).unwrap();
    config.retry.max_elapsed = Duration::from_millis(100);
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(2);
    config
}

pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub fleet: Arc<InMemoryFleet>,
    pub alerts: Arc<InMemoryAlerts>,
    pub subscription_checks: Arc<InMemoryQueue>,
    pub power_actions: Arc<InMemoryQueue>,
    pub deferred_checks: Arc<InMemoryQueue>,
    pub engine: Engine,
}

impl Harness {
    pub fn new(resources: Vec<ResourceState>) -> Self {
        Self::with_alerts(resources, Vec::new())
    }

    pub fn with_alerts(resources: Vec<ResourceState>, rules: Vec<AlertRule>) -> Self {
        let clock = Arc::new(FixedClock::new(monday_evening()));
        let fleet = Arc::new(InMemoryFleet::with_resources(resources));
        let alerts = Arc::new(InMemoryAlerts::new(rules));
        let subscription_checks = Arc::new(InMemoryQueue::new("process-subs", clock.clone()));
        let power_actions = Arc::new(InMemoryQueue::new("powermgmt-events", clock.clone()));
        let deferred_checks = Arc::new(InMemoryQueue::new("powermgmt-deferred-checks", clock.clone()));

        let collaborators = Collaborators {
            providers: Arc::new(InMemoryFactory::new(fleet.clone())),
            suppressor: alerts.clone(),
            alerts: alerts.clone(),
            directory: Arc::new(InMemoryDirectory::new(vec![Subscription {
                id: SUB.into(),
                display_name: "Dev".into(),
                state: "Enabled".into(),
            }])),
            maintenance_runs: Arc::new(InMemoryMaintenanceRuns::default()),
            calendar: Arc::new(NoHolidays),
            clock: clock.clone(),
        };
        let outbox = Outbox::new(
            subscription_checks.clone(),
            power_actions.clone(),
            deferred_checks.clone(),
        );
        let engine = Engine::new(&test_config(), collaborators, outbox);

        Self {
            clock,
            fleet,
            alerts,
            subscription_checks,
            power_actions,
            deferred_checks,
            engine,
        }
    }

    /// Take every visible deferred check off the queue.
    pub async fn take_deferred(&self) -> Vec<DeferredCheck> {
        let batch = self.deferred_checks.receive(10).await.unwrap();
        let mut checks = Vec::new();
        for msg in batch {
            checks.push(decode(&msg).unwrap());
            self.deferred_checks.ack(&msg.receipt).await.unwrap();
        }
        checks
    }
}

pub fn vm(power_state: &str) -> ResourceState {
    ResourceState::new(VM, ResourceKind::VirtualMachine, Some(power_state))
}
