//! Turns a [`PowerAction`] into provider calls.

use std::sync::Arc;

use tracing::{debug, error, info};

use powermgmt_alerts::suppression_rule_name;
use powermgmt_core::tags::AuditStatus;
use powermgmt_core::{DeferredCheck, PowerAction};

use crate::context::{LoadedResource, WorkflowContext};
use crate::deferred::{CheckOutcome, DeferredChecker};
use crate::error::Result;
use crate::maintenance::{plan_transition, suppresses_alerts, MaintenanceState, Operation, TransitionPlan};
use crate::provider::{OperationHandle, OperationStatus};

/// What a power action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// An operation was issued and is being tracked.
    Deferred,
    /// The operation finished immediately and was completed in place.
    Completed(CheckOutcome),
    /// The provider rejected the operation.
    Failed,
    /// Only a status tag was written.
    Tagged(AuditStatus),
    /// The resource was not in a state the action applies to.
    Skipped,
    NotFound,
}

pub struct PowerActionHandler {
    ctx: Arc<WorkflowContext>,
    checker: Arc<DeferredChecker>,
}

impl PowerActionHandler {
    pub fn new(ctx: Arc<WorkflowContext>, checker: Arc<DeferredChecker>) -> Self {
        Self { ctx, checker }
    }

    pub async fn handle(&self, action: &PowerAction) -> Result<ActionOutcome> {
        let Some(loaded) = self
            .ctx
            .load("power action", &action.id, action.sub_type.as_deref())
            .await?
        else {
            return Ok(ActionOutcome::NotFound);
        };
        let resource = &loaded.state;

        if suppresses_alerts(action.action) && !action.alert_ids.is_empty() {
            let rule = suppression_rule_name(resource.name());
            self.ctx
                .retry
                .run("suppress_alerts", || {
                    self.ctx
                        .suppressor
                        .set_suppressed(&loaded.id, &rule, &action.alert_ids, true)
                })
                .await?;
            info!(resource = %resource.name(), rule = %rule, alerts = action.alert_ids.len(), "Suppressed alerts");
        }

        let state = MaintenanceState::of(resource);
        let plan = plan_transition(
            action.action,
            state,
            loaded.provider.is_startable(resource),
            loaded.provider.is_stoppable(resource),
            resource.kind.stop_tag_policy(),
        );
        debug!(
            resource = %resource.name(),
            action = %action.action,
            power_state = %resource.power_state,
            maintenance = ?state,
            plan = ?plan,
            "Planned transition"
        );

        match plan {
            TransitionPlan::Nothing => {
                info!(
                    resource = %resource.name(),
                    action = %action.action,
                    power_state = %resource.power_state,
                    "Resource not in a state to action, skipping"
                );
                Ok(ActionOutcome::Skipped)
            }
            TransitionPlan::TagOnly(status) => {
                info!(resource = %resource.name(), action = %action.action, status = %status, "Recording status only");
                self.ctx
                    .write_status(loaded.provider.as_ref(), resource, status.as_str())
                    .await?;
                Ok(ActionOutcome::Tagged(status))
            }
            TransitionPlan::Issue {
                operation,
                reason,
                tag_first,
                on_completion,
            } => {
                if let Some(status) = tag_first {
                    self.ctx
                        .write_status(loaded.provider.as_ref(), resource, status.as_str())
                        .await?;
                }
                let handle = self.issue(&loaded, operation, reason).await?;
                let check = DeferredCheck::new(
                    action.clone(),
                    on_completion.map(|s| s.as_str()),
                    handle.continuation_token.clone(),
                );
                self.track(&loaded, check, operation, handle).await
            }
        }
    }

    async fn issue(&self, loaded: &LoadedResource, operation: Operation, reason: &str) -> Result<OperationHandle> {
        let provider = &loaded.provider;
        let resource = &loaded.state;
        info!(resource = %resource.name(), operation = operation.as_str(), reason, "Issuing power operation");
        let handle = match operation {
            Operation::Start => {
                self.ctx
                    .retry
                    .run("start", || provider.begin_start(resource, reason))
                    .await?
            }
            Operation::Stop => {
                self.ctx
                    .retry
                    .run("stop", || provider.begin_stop(resource, reason))
                    .await?
            }
        };
        Ok(handle)
    }

    async fn track(
        &self,
        loaded: &LoadedResource,
        check: DeferredCheck,
        operation: Operation,
        handle: OperationHandle,
    ) -> Result<ActionOutcome> {
        match handle.status {
            OperationStatus::InProgress => {
                self.ctx
                    .outbox
                    .send_deferred_check(&check, self.ctx.deferred.delay)
                    .await?;
                Ok(ActionOutcome::Deferred)
            }
            OperationStatus::Succeeded => {
                let outcome = self.checker.complete(loaded, check, OperationStatus::Succeeded).await?;
                Ok(ActionOutcome::Completed(outcome))
            }
            OperationStatus::Failed => {
                error!(
                    resource = %loaded.state.name(),
                    operation = operation.as_str(),
                    action = %check.action.action,
                    "Power operation failed"
                );
                Ok(ActionOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use powermgmt_alerts::AlertRule;
    use powermgmt_core::tags::{TAG_LAST_UPDATED, TAG_STATUS};
    use powermgmt_core::{AuditResult, Clock, PowerActionKind, ResourceKind, ResourceState};

    use crate::memory::ProviderCall;
    use crate::testkit::{vm, Harness, AGW, PSQL, VM};

    fn handler(h: &Harness) -> PowerActionHandler {
        let ctx = h.engine.context.clone();
        PowerActionHandler::new(ctx.clone(), Arc::new(DeferredChecker::new(ctx)))
    }

    fn action(id: &str, kind: PowerActionKind) -> PowerAction {
        PowerAction::new(id, None, kind, Utc::now())
    }

    #[tokio::test]
    async fn stop_in_progress_enqueues_deferred_check() {
        let h = Harness::new(vec![vm("running")]);
        h.fleet.set_polls_to_complete(3);

        let outcome = handler(&h).handle(&action(VM, PowerActionKind::Stop)).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Deferred);

        let pending = h.deferred_checks.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].visible_at, h.clock.now() + chrono::Duration::seconds(60));

        h.clock.advance(chrono::Duration::seconds(60));
        let checks = h.take_deferred().await;
        assert_eq!(checks[0].tag_text, "Auto-stopped");
        assert_eq!(checks[0].wait_retries, 0);
        assert!(checks[0].continuation_token.is_some());
    }

    #[tokio::test]
    async fn immediate_success_completes_in_place() {
        let h = Harness::new(vec![vm("running")]);

        let outcome = handler(&h).handle(&action(VM, PowerActionKind::Stop)).await.unwrap();
        let ActionOutcome::Completed(check) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(check.result, AuditResult::Succeeded);
        assert!(h.deferred_checks.is_empty().await);

        let stored = h.fleet.resource(VM).unwrap();
        assert_eq!(stored.power_state, "deallocated");
        assert_eq!(stored.tag(TAG_STATUS), Some("Auto-stopped"));
        assert_eq!(stored.tag(TAG_LAST_UPDATED), Some("2025-01-13 18:02:00 NZT"));
    }

    #[tokio::test]
    async fn immediate_success_with_failed_tag_write_is_polled_again() {
        let h = Harness::new(vec![vm("deallocated")]);
        h.fleet.fail_tag_writes(1);

        let outcome = handler(&h).handle(&action(VM, PowerActionKind::Start)).await.unwrap();
        let ActionOutcome::Completed(check) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(check.result, AuditResult::InProgress);
        assert_eq!(check.wait_retries, 1);
        assert!(check.requeued);
    }

    #[tokio::test]
    async fn postgres_is_tagged_before_stopping() {
        let db = ResourceState::new(PSQL, ResourceKind::PostgresFlexibleServer, Some("Ready"));
        let h = Harness::new(vec![db]);
        h.fleet.set_polls_to_complete(1);

        let outcome = handler(&h).handle(&action(PSQL, PowerActionKind::Stop)).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Deferred);

        let calls = h.fleet.calls();
        let tag_at = calls.iter().position(|c| matches!(c, ProviderCall::AddTags(..))).unwrap();
        let stop_at = calls.iter().position(|c| matches!(c, ProviderCall::BeginStop(_))).unwrap();
        assert!(tag_at < stop_at);

        h.clock.advance(chrono::Duration::seconds(60));
        let checks = h.take_deferred().await;
        assert_eq!(checks[0].tag_text, "");
    }

    #[tokio::test]
    async fn application_gateway_stop_writes_no_tags() {
        let agw = ResourceState::new(AGW, ResourceKind::ApplicationGateway, Some("Running"));
        let h = Harness::new(vec![agw]);

        handler(&h).handle(&action(AGW, PowerActionKind::Stop)).await.unwrap();
        assert!(!h.fleet.calls().iter().any(|c| matches!(c, ProviderCall::AddTags(..))));
        assert_eq!(h.fleet.resource(AGW).unwrap().power_state, "stopped");
    }

    #[tokio::test]
    async fn stop_suppresses_alerts_first() {
        let h = Harness::with_alerts(vec![vm("running")], vec![AlertRule::new("alert-1", vec!["/subscriptions/sub-1".into()])]);
        let stop = action(VM, PowerActionKind::Stop).with_alert_ids(vec!["alert-1".into()]);

        handler(&h).handle(&stop).await.unwrap();
        let calls = h.alerts.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].suppressed);
        assert_eq!(calls[0].rule_name, "AzAPR_vm-01_disableactiongroup");
    }

    #[tokio::test]
    async fn start_on_running_resource_is_skipped() {
        let h = Harness::new(vec![vm("running")]);
        let outcome = handler(&h).handle(&action(VM, PowerActionKind::Start)).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Skipped);
        assert!(!h.fleet.calls().iter().any(|c| matches!(c, ProviderCall::BeginStart(_))));
    }

    #[tokio::test]
    async fn contention_is_retried() {
        let h = Harness::new(vec![vm("running")]);
        h.fleet.contend(2);
        let outcome = handler(&h).handle(&action(VM, PowerActionKind::Stop)).await.unwrap();
        assert!(matches!(outcome, ActionOutcome::Completed(_)));
        let stops = h
            .fleet
            .calls()
            .iter()
            .filter(|c| matches!(c, ProviderCall::BeginStop(_)))
            .count();
        assert_eq!(stops, 3);
    }

    #[tokio::test]
    async fn failed_operation_is_terminal() {
        let h = Harness::new(vec![vm("running")]);
        h.fleet.set_fail_operations(true);
        let outcome = handler(&h).handle(&action(VM, PowerActionKind::Stop)).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Failed);
        assert!(h.deferred_checks.is_empty().await);
    }

    #[tokio::test]
    async fn missing_resource_is_not_an_error() {
        let h = Harness::new(Vec::new());
        let outcome = handler(&h).handle(&action(VM, PowerActionKind::Stop)).await.unwrap();
        assert_eq!(outcome, ActionOutcome::NotFound);
    }

    #[tokio::test]
    async fn unsupported_resource_type_is_malformed() {
        let h = Harness::new(Vec::new());
        let id = "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Web/sites/app";
        let err = handler(&h).handle(&action(id, PowerActionKind::Stop)).await.unwrap_err();
        assert!(matches!(err, crate::error::EngineError::MalformedMessage { .. }));
    }
}
