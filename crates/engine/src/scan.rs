//! Per-subscription scan: evaluate every scheduled resource and enqueue the
//! power actions due on this tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use powermgmt_alerts::{matching_alert_ids, AlertRule};
use powermgmt_core::{AuditEvent, AuditResult, PowerAction, ResourceKind, ResourceState, SubscriptionCheck};
use powermgmt_schedule::{CronPair, Direction, ScheduleEvaluator, ScheduleResolution};

use crate::context::WorkflowContext;
use crate::error::{EngineError, Result};
use crate::provider::{AlertSource, PowerProvider, TagFilter};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSummary {
    pub subscription_id: String,
    pub scanned: usize,
    pub invalid: usize,
    pub opted_out: usize,
    pub actions: Vec<PowerAction>,
}

/// The evaluation tick a scan runs for.
struct Tick<'a> {
    last_check: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    correlation_id: &'a str,
}

pub struct SubscriptionScanner {
    ctx: Arc<WorkflowContext>,
    evaluator: ScheduleEvaluator,
    alerts: Arc<dyn AlertSource>,
    types_enabled: Vec<ResourceKind>,
    reset_last_invocation: bool,
}

impl SubscriptionScanner {
    pub fn new(
        ctx: Arc<WorkflowContext>,
        evaluator: ScheduleEvaluator,
        alerts: Arc<dyn AlertSource>,
        types_enabled: Vec<ResourceKind>,
        reset_last_invocation: bool,
    ) -> Self {
        Self {
            ctx,
            evaluator,
            alerts,
            types_enabled,
            reset_last_invocation,
        }
    }

    pub async fn scan(&self, check: &SubscriptionCheck, correlation_id: &str) -> Result<ScanSummary> {
        let last_check = check
            .last_check_time()
            .map_err(|e| EngineError::malformed("subscription check", e.to_string()))?;
        let last_check = if self.reset_last_invocation {
            warn!("Not considering last invocation time during cronchecks");
            None
        } else {
            last_check
        };
        let now = self.ctx.clock.now();
        let tick = Tick {
            last_check,
            now,
            correlation_id,
        };

        info!(
            subscription = %check.id,
            name = %check.display_name,
            last_check = ?last_check,
            "Scanning subscription"
        );

        let alerts = self
            .ctx
            .retry
            .run("alerts", || self.alerts.alerts_for_subscription(&check.id))
            .await?;

        let mut summary = ScanSummary {
            subscription_id: check.id.clone(),
            ..Default::default()
        };

        for kind in &self.types_enabled {
            let provider = self.ctx.providers.provider(&check.id, *kind)?;
            let filter = TagFilter::for_kind(*kind);
            let resources = self
                .ctx
                .retry
                .run("list_tagged", || provider.list_tagged(&filter))
                .await?;

            for resource in resources {
                summary.scanned += 1;
                match self.evaluator.resolve(&resource, now) {
                    ScheduleResolution::Invalid(invalid) => {
                        summary.invalid += 1;
                        AuditEvent::new("tagcheck", &resource)
                            .result(AuditResult::Failed)
                            .field("debug", &invalid.message)
                            .emit();
                        if let Err(e) = self
                            .ctx
                            .write_status(provider.as_ref(), &resource, &invalid.message)
                            .await
                        {
                            warn!(resource = %resource.name(), error = %e, "Could not report invalid schedule tag");
                        }
                    }
                    ScheduleResolution::OptedOut(_) => summary.opted_out += 1,
                    ScheduleResolution::Resolved(pair) => {
                        let fired = self
                            .evaluate(provider.as_ref(), &resource, &pair, &alerts, &tick)
                            .await?;
                        summary.actions.extend(fired);
                    }
                }
            }
        }

        info!(
            subscription = %check.id,
            scanned = summary.scanned,
            invalid = summary.invalid,
            opted_out = summary.opted_out,
            actions = summary.actions.len(),
            "Subscription scan complete"
        );
        Ok(summary)
    }

    async fn evaluate(
        &self,
        provider: &dyn PowerProvider,
        resource: &ResourceState,
        pair: &CronPair,
        alerts: &[AlertRule],
        tick: &Tick<'_>,
    ) -> Result<Vec<PowerAction>> {
        let mut fired = Vec::new();

        for direction in [Direction::PowerOff, Direction::PowerOn] {
            let eligible = match direction {
                Direction::PowerOff => provider.is_stoppable(resource),
                Direction::PowerOn => provider.is_startable(resource),
            };
            if !eligible {
                continue;
            }
            let Some(decision) = self
                .evaluator
                .check(resource, direction, pair, tick.last_check, tick.now, tick.correlation_id)
            else {
                continue;
            };
            if !decision.fire {
                continue;
            }

            let action = PowerAction::new(&resource.id, resource.kind.sub_type(), direction.action(), tick.now)
                .with_alert_ids(matching_alert_ids(alerts, &resource.id, resource.resource_type()));
            self.ctx.outbox.send_power_action(&action).await?;

            AuditEvent::new("powerAction", resource)
                .result(AuditResult::Succeeded)
                .field("action", action.action.as_str())
                .field("alertIds", &action.alert_ids)
                .field("invocationId", tick.correlation_id)
                .emit();
            fired.push(action);
        }

        Ok(fired)
    }
}
