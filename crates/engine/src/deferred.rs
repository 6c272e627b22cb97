//! Deferred completion checks for in-flight power operations.

use std::sync::Arc;

use tracing::{info, warn};

use powermgmt_alerts::suppression_rule_name;
use powermgmt_core::{AuditEvent, AuditResult, DeferredCheck, PowerActionKind, ResourceId};

use crate::context::{LoadedResource, WorkflowContext};
use crate::error::Result;
use crate::provider::OperationStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub result: AuditResult,
    pub wait_retries: u32,
    /// Whether another check was enqueued.
    pub requeued: bool,
}

pub struct DeferredChecker {
    ctx: Arc<WorkflowContext>,
}

impl DeferredChecker {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    /// Poll an in-flight operation once. `None` when the resource is gone.
    pub async fn check(&self, check: DeferredCheck) -> Result<Option<CheckOutcome>> {
        let Some(loaded) = self
            .ctx
            .load("deferred check", &check.action.id, check.action.sub_type.as_deref())
            .await?
        else {
            return Ok(None);
        };

        let token = check.continuation_token.as_deref();
        let timeout = self.ctx.deferred.poll_timeout;
        let polled = if check.action.action.is_start() {
            loaded.provider.poll_start(&loaded.state, token, timeout).await
        } else {
            loaded.provider.poll_stop(&loaded.state, token, timeout).await
        };

        let status = match polled {
            Ok(status) => status,
            Err(e) => {
                info!(resource = %loaded.state.name(), error = %e, "Failed to check operation status");
                OperationStatus::Failed
            }
        };

        self.complete(&loaded, check, status).await.map(Some)
    }

    /// Act on an operation's status: write the pending tag, re-enable alerts,
    /// or schedule another check. Shared with actions that complete
    /// immediately.
    pub(crate) async fn complete(
        &self,
        loaded: &LoadedResource,
        mut check: DeferredCheck,
        status: OperationStatus,
    ) -> Result<CheckOutcome> {
        let mut result = status.audit_result();
        let resource = &loaded.state;

        if result == AuditResult::Succeeded {
            if let Some(text) = check.pending_tag() {
                let applied = match self.ctx.write_status(loaded.provider.as_ref(), resource, text).await {
                    Ok(applied) => applied,
                    Err(e) => {
                        warn!(resource = %resource.name(), error = %e, "Status tag write failed");
                        false
                    }
                };
                if !applied {
                    info!(
                        action = %check.action.action,
                        resource = %resource.name(),
                        tag = %text,
                        "Action succeeded but updating tags failed, waiting again"
                    );
                    result = AuditResult::InProgress;
                }
            }
        }

        let mut requeued = false;
        match result {
            AuditResult::Succeeded => {
                if check.action.action == PowerActionKind::Start && !check.action.alert_ids.is_empty() {
                    self.reenable_alerts(&loaded.id, resource.name(), &check.action.alert_ids)
                        .await?;
                }
            }
            AuditResult::InProgress => {
                check.wait_retries += 1;
                if check.wait_retries > self.ctx.deferred.max_retries {
                    warn!(
                        resource = %resource.name(),
                        action = %check.action.action,
                        wait_retries = check.wait_retries,
                        "Gave up waiting for operation"
                    );
                    result = AuditResult::Timeout;
                } else {
                    self.ctx
                        .outbox
                        .send_deferred_check(&check, self.ctx.deferred.delay)
                        .await?;
                    requeued = true;
                }
            }
            AuditResult::Failed | AuditResult::Timeout => {}
        }

        AuditEvent::new("checkPowerMgmtStatus", resource)
            .result(result)
            .field("action", check.action.action.as_str())
            .field("tag_text", &check.tag_text)
            .field("attempt_num", check.action.attempt_num)
            .field("wait_retries", check.wait_retries)
            .emit();

        Ok(CheckOutcome {
            result,
            wait_retries: check.wait_retries,
            requeued,
        })
    }

    async fn reenable_alerts(&self, id: &ResourceId, name: &str, alert_ids: &[String]) -> Result<()> {
        let rule = suppression_rule_name(name);
        self.ctx
            .retry
            .run("reenable_alerts", || {
                self.ctx.suppressor.set_suppressed(id, &rule, alert_ids, false)
            })
            .await?;
        info!(resource = %name, rule = %rule, alerts = alert_ids.len(), "Re-enabled alerts");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use powermgmt_alerts::AlertRule;
    use powermgmt_core::tags::TAG_STATUS;
    use powermgmt_core::{PowerAction, ResourceKind};

    use crate::provider::ProviderFactory;
    use crate::testkit::{vm, Harness, SUB, VM};

    async fn started_check(h: &Harness, kind: PowerActionKind, tag: &str) -> DeferredCheck {
        let provider = h
            .engine
            .context
            .providers
            .provider(SUB, ResourceKind::VirtualMachine)
            .unwrap();
        let resource = h.fleet.resource(VM).unwrap();
        let handle = if kind.is_start() {
            provider.begin_start(&resource, "test").await.unwrap()
        } else {
            provider.begin_stop(&resource, "test").await.unwrap()
        };
        let action = PowerAction::new(VM, None, kind, Utc::now()).with_alert_ids(vec!["alert-1".into()]);
        DeferredCheck::new(action, Some(tag), handle.continuation_token)
    }

    #[tokio::test]
    async fn success_writes_pending_tag_and_reenables_alerts() {
        let h = Harness::with_alerts(vec![vm("deallocated")], vec![AlertRule::new("alert-1", vec![])]);
        h.fleet.set_polls_to_complete(1);
        let check = started_check(&h, PowerActionKind::Start, "Auto-started").await;
        let checker = DeferredChecker::new(h.engine.context.clone());

        let first = checker.check(check.clone()).await.unwrap().unwrap();
        assert_eq!(first.result, AuditResult::InProgress);
        assert_eq!(first.wait_retries, 1);
        assert!(first.requeued);

        let second = checker.check(check).await.unwrap().unwrap();
        assert_eq!(second.result, AuditResult::Succeeded);
        assert_eq!(h.fleet.resource(VM).unwrap().tag(TAG_STATUS), Some("Auto-started"));

        let calls = h.alerts.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].suppressed);
    }

    #[tokio::test]
    async fn stop_success_leaves_alerts_suppressed() {
        let h = Harness::new(vec![vm("running")]);
        h.fleet.set_polls_to_complete(1);
        let check = started_check(&h, PowerActionKind::Stop, "Auto-stopped").await;
        let checker = DeferredChecker::new(h.engine.context.clone());

        checker.check(check.clone()).await.unwrap();
        let outcome = checker.check(check).await.unwrap().unwrap();
        assert_eq!(outcome.result, AuditResult::Succeeded);
        assert!(h.alerts.calls().is_empty());
    }

    #[tokio::test]
    async fn tag_write_failure_counts_as_in_progress() {
        let h = Harness::new(vec![vm("running")]);
        h.fleet.set_polls_to_complete(0);
        let mut check = started_check(&h, PowerActionKind::Stop, "Auto-stopped").await;
        check.continuation_token = None;
        h.fleet.fail_tag_writes(1);

        let loaded = h
            .engine
            .context
            .load("deferred check", VM, None)
            .await
            .unwrap()
            .unwrap();
        let checker = DeferredChecker::new(h.engine.context.clone());
        let outcome = checker
            .complete(&loaded, check, OperationStatus::Succeeded)
            .await
            .unwrap();
        assert_eq!(outcome.result, AuditResult::InProgress);
        assert!(outcome.requeued);
    }

    #[tokio::test]
    async fn poll_errors_are_terminal_failures() {
        let h = Harness::new(vec![vm("running")]);
        let action = PowerAction::new(VM, None, PowerActionKind::Stop, Utc::now());
        let check = DeferredCheck::new(action, Some("Auto-stopped"), Some("op-unknown".into()));

        let outcome = DeferredChecker::new(h.engine.context.clone())
            .check(check)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.result, AuditResult::Failed);
        assert!(!outcome.requeued);
        assert!(h.deferred_checks.is_empty().await);
    }

    #[tokio::test]
    async fn retries_past_the_bound_time_out() {
        let h = Harness::new(vec![vm("running")]);
        h.fleet.set_polls_to_complete(u32::MAX);
        let mut check = started_check(&h, PowerActionKind::Stop, "Auto-stopped").await;
        check.wait_retries = 10;

        let outcome = DeferredChecker::new(h.engine.context.clone())
            .check(check)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.result, AuditResult::Timeout);
        assert_eq!(outcome.wait_retries, 11);
        assert!(!outcome.requeued);
        assert!(h.deferred_checks.is_empty().await);
    }

    #[tokio::test]
    async fn missing_resource_ends_the_check() {
        let h = Harness::new(Vec::new());
        let action = PowerAction::new(VM, None, PowerActionKind::Stop, Utc::now());
        let outcome = DeferredChecker::new(h.engine.context.clone())
            .check(DeferredCheck::new(action, None, None))
            .await
            .unwrap();
        assert!(outcome.is_none());
    }
}
