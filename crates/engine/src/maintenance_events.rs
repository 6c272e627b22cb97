//! Maintenance run events: start machines before a run, stop them after.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use powermgmt_alerts::{matching_alert_ids, AlertRule};
use powermgmt_core::{MaintenanceEvent, PowerAction, PowerActionKind, PowerMgmtError, ResourceId, ResourceKind};

use crate::context::WorkflowContext;
use crate::error::Result;
use crate::maintenance::MaintenanceState;
use crate::provider::{AlertSource, MaintenanceRunSource};

pub struct MaintenanceIntake {
    ctx: Arc<WorkflowContext>,
    runs: Arc<dyn MaintenanceRunSource>,
    alerts: Arc<dyn AlertSource>,
}

impl MaintenanceIntake {
    pub fn new(ctx: Arc<WorkflowContext>, runs: Arc<dyn MaintenanceRunSource>, alerts: Arc<dyn AlertSource>) -> Self {
        Self { ctx, runs, alerts }
    }

    /// Enqueue the power actions for a maintenance event. Returns them.
    pub async fn handle(&self, event: &MaintenanceEvent) -> Result<Vec<PowerAction>> {
        let pre = event.is_pre_maintenance();
        let correlation_id = &event.data.correlation_id;
        let vm_ids = self
            .ctx
            .retry
            .run("maintenance_run", || self.runs.vm_ids_for_run(correlation_id))
            .await?;

        if vm_ids.is_empty() {
            info!(event = %event.id, correlation_id = %correlation_id, "No resources for maintenance event");
            return Ok(Vec::new());
        }

        let now = self.ctx.clock.now();
        let mut alerts_by_sub: HashMap<String, Vec<AlertRule>> = HashMap::new();
        let mut enqueued = Vec::new();

        for raw_id in vm_ids {
            let id = match ResourceId::parse(&raw_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!(resource_id = %raw_id, error = %e, "Skipping unparsable maintenance resource");
                    continue;
                }
            };
            let provider = self
                .ctx
                .providers
                .provider(id.subscription_id(), ResourceKind::VirtualMachine)?;

            let vm = match self.ctx.retry.run("get", || provider.get(&id)).await {
                Ok(vm) => vm,
                Err(PowerMgmtError::NotFound(_)) => {
                    warn!(vm = %id.name(), "Could not find vm");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            debug!(vm = %vm.name(), power_state = %vm.power_state, "Found maintenance vm");

            if vm.is_exempt() {
                if pre && !vm.is_running() {
                    warn!(
                        vm = %vm.id,
                        event_type = %event.event_type,
                        "VM is not running but has opted out of power management, so will miss this maintenance window"
                    );
                }
                continue;
            }

            let kind = if pre {
                PowerActionKind::StartForUpdates
            } else if MaintenanceState::of(&vm).in_window() {
                PowerActionKind::StopPostUpdates
            } else {
                continue;
            };

            if !alerts_by_sub.contains_key(id.subscription_id()) {
                let rules = self
                    .ctx
                    .retry
                    .run("alerts", || self.alerts.alerts_for_subscription(id.subscription_id()))
                    .await?;
                alerts_by_sub.insert(id.subscription_id().to_string(), rules);
            }
            let alert_ids = alerts_by_sub
                .get(id.subscription_id())
                .map(|rules| matching_alert_ids(rules, &vm.id, vm.resource_type()))
                .unwrap_or_default();

            let action = PowerAction::new(&vm.id, None, kind, now).with_alert_ids(alert_ids);
            self.ctx.outbox.send_power_action(&action).await?;
            enqueued.push(action);
        }

        info!(
            event = %event.id,
            pre_maintenance = pre,
            actions = enqueued.len(),
            "Processed maintenance event"
        );
        Ok(enqueued)
    }
}
