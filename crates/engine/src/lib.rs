//! Power action workflow: subscription scans, the power action state
//! machine, deferred completion checks and maintenance window intake.
//!
//! Every handler reads its collaborators through traits in [`provider`] and
//! keeps no state between invocations; progress lives in resource tags and
//! queue messages.

pub mod context;
pub mod deferred;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod maintenance_events;
pub mod memory;
pub mod outbox;
pub mod provider;
pub mod retry;
pub mod scan;
pub mod state_machine;
pub mod trigger;

#[cfg(test)]
mod testkit;

pub use context::WorkflowContext;
pub use deferred::{CheckOutcome, DeferredChecker};
pub use dispatch::{run_consumer, ConsumerOptions, Dispatcher, MessageKind};
pub use engine::{Collaborators, Engine};
pub use error::{EngineError, Result};
pub use maintenance::{plan_transition, MaintenanceState, Operation, TransitionPlan};
pub use maintenance_events::MaintenanceIntake;
pub use memory::{
    InMemoryAlerts, InMemoryDirectory, InMemoryFactory, InMemoryFleet, InMemoryMaintenanceRuns,
    InMemoryProvider, InMemoryTickStore, ProviderCall, SuppressionCall,
};
pub use outbox::Outbox;
pub use provider::{
    AlertSource, AlertSuppressor, MaintenanceRunSource, OperationHandle, OperationStatus,
    PowerProvider, ProviderFactory, SubscriptionDirectory, TagFilter, TickStore,
};
pub use retry::RetryPolicy;
pub use scan::{ScanSummary, SubscriptionScanner};
pub use state_machine::{ActionOutcome, PowerActionHandler};
pub use trigger::{Scope, SubscriptionTrigger};
