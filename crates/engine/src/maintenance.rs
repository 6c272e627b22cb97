//! Maintenance window state and the power action transition table.
//!
//! The window marker lives in the resource's status tag, so the state is
//! recovered from tags on every invocation.

use powermgmt_core::tags::{AuditStatus, TAG_STATUS};
use powermgmt_core::{PowerActionKind, ResourceState, StopTagPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceState {
    NotInWindow,
    /// Started by a pre-maintenance event; stop again afterwards.
    StartedForMaintenance,
    /// Already running when the window opened; leave running afterwards.
    InMaintenance,
    /// A scheduled stop arrived during the window.
    StopPending,
}

impl MaintenanceState {
    pub fn from_status(value: Option<&str>) -> Self {
        match value.and_then(AuditStatus::parse) {
            Some(AuditStatus::StartedForMaintenance) => MaintenanceState::StartedForMaintenance,
            Some(AuditStatus::InMaintenance) => MaintenanceState::InMaintenance,
            Some(AuditStatus::StopPending) => MaintenanceState::StopPending,
            _ => MaintenanceState::NotInWindow,
        }
    }

    pub fn of(resource: &ResourceState) -> Self {
        Self::from_status(resource.tag(TAG_STATUS))
    }

    pub fn in_window(&self) -> bool {
        *self != MaintenanceState::NotInWindow
    }

    /// Whether the resource should be stopped once the window closes.
    pub fn stop_after_window(&self) -> bool {
        matches!(
            self,
            MaintenanceState::StopPending | MaintenanceState::StartedForMaintenance
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Stop,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Issue `operation`. `tag_first` is written before issuing it and
    /// `on_completion` once it has succeeded.
    Issue {
        operation: Operation,
        reason: &'static str,
        tag_first: Option<AuditStatus>,
        on_completion: Option<AuditStatus>,
    },
    /// Record a status without changing power state.
    TagOnly(AuditStatus),
    Nothing,
}

/// Alerts are silenced before any stop-type action.
pub fn suppresses_alerts(action: PowerActionKind) -> bool {
    matches!(action, PowerActionKind::Stop | PowerActionKind::StopPostUpdates)
}

pub fn plan_transition(
    action: PowerActionKind,
    state: MaintenanceState,
    startable: bool,
    stoppable: bool,
    policy: StopTagPolicy,
) -> TransitionPlan {
    match action {
        PowerActionKind::Start if startable => TransitionPlan::Issue {
            operation: Operation::Start,
            reason: "scheduled",
            tag_first: None,
            on_completion: Some(AuditStatus::Started),
        },
        PowerActionKind::Start => TransitionPlan::Nothing,

        PowerActionKind::StartForUpdates if startable => TransitionPlan::Issue {
            operation: Operation::Start,
            reason: "pre-maintenance window",
            tag_first: None,
            on_completion: Some(AuditStatus::StartedForMaintenance),
        },
        PowerActionKind::StartForUpdates => TransitionPlan::TagOnly(AuditStatus::InMaintenance),

        PowerActionKind::Stop if stoppable && state.in_window() => {
            TransitionPlan::TagOnly(AuditStatus::StopPending)
        }
        PowerActionKind::Stop if stoppable => {
            let (tag_first, on_completion) = match policy {
                StopTagPolicy::OnCompletion => (None, Some(AuditStatus::Stopped)),
                StopTagPolicy::BeforeStop => (Some(AuditStatus::Stopped), None),
                StopTagPolicy::Skip => (None, None),
            };
            TransitionPlan::Issue {
                operation: Operation::Stop,
                reason: "scheduled",
                tag_first,
                on_completion,
            }
        }
        PowerActionKind::Stop => TransitionPlan::Nothing,

        PowerActionKind::StopPostUpdates if stoppable && state.stop_after_window() => {
            TransitionPlan::Issue {
                operation: Operation::Stop,
                reason: "post-maintenance window",
                tag_first: None,
                on_completion: Some(AuditStatus::StoppedPostMaintenance),
            }
        }
        PowerActionKind::StopPostUpdates => TransitionPlan::TagOnly(AuditStatus::MaintenanceCompleted),
    }
}
