//! Wiring: builds every handler from config and collaborators.

use std::sync::Arc;

use powermgmt_core::{Clock, Config};
use powermgmt_schedule::{HolidayCalendar, ScheduleEvaluator};

use crate::context::WorkflowContext;
use crate::deferred::DeferredChecker;
use crate::dispatch::Dispatcher;
use crate::maintenance_events::MaintenanceIntake;
use crate::outbox::Outbox;
use crate::provider::{AlertSource, AlertSuppressor, MaintenanceRunSource, ProviderFactory, SubscriptionDirectory};
use crate::retry::RetryPolicy;
use crate::scan::SubscriptionScanner;
use crate::state_machine::PowerActionHandler;
use crate::trigger::SubscriptionTrigger;

/// External systems the workflow talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub providers: Arc<dyn ProviderFactory>,
    pub suppressor: Arc<dyn AlertSuppressor>,
    pub alerts: Arc<dyn AlertSource>,
    pub directory: Arc<dyn SubscriptionDirectory>,
    pub maintenance_runs: Arc<dyn MaintenanceRunSource>,
    pub calendar: Arc<dyn HolidayCalendar>,
    pub clock: Arc<dyn Clock>,
}

pub struct Engine {
    pub trigger: SubscriptionTrigger,
    pub dispatcher: Arc<Dispatcher>,
    pub context: Arc<WorkflowContext>,
}

impl Engine {
    pub fn new(config: &Config, collaborators: Collaborators, outbox: Outbox) -> Self {
        let ctx = Arc::new(WorkflowContext::new(
            config,
            collaborators.providers.clone(),
            collaborators.suppressor.clone(),
            outbox.clone(),
            collaborators.clock.clone(),
        ));

        let evaluator = ScheduleEvaluator::from_config(&config.schedule, collaborators.calendar.clone());
        let scanner = SubscriptionScanner::new(
            ctx.clone(),
            evaluator,
            collaborators.alerts.clone(),
            config.schedule.types_enabled.clone(),
            config.trigger.reset_last_invocation,
        );
        let checker = Arc::new(DeferredChecker::new(ctx.clone()));
        let actions = PowerActionHandler::new(ctx.clone(), checker.clone());
        let maintenance = MaintenanceIntake::new(
            ctx.clone(),
            collaborators.maintenance_runs.clone(),
            collaborators.alerts.clone(),
        );

        let trigger = SubscriptionTrigger::new(
            collaborators.directory.clone(),
            outbox,
            RetryPolicy::from_config(&config.retry),
        );

        Self {
            trigger,
            dispatcher: Arc::new(Dispatcher::new(scanner, actions, checker, maintenance)),
            context: ctx,
        }
    }
}
