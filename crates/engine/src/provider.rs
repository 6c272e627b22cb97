//! Collaborator interfaces.
//!
//! Cloud API clients live outside this workspace; the workflow only sees
//! these traits. [`crate::memory`] has in-process implementations of each.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use powermgmt_alerts::AlertRule;
use powermgmt_core::tags::SCHEDULE_TAGS;
use powermgmt_core::{AuditResult, PowerMgmtError, ResourceId, ResourceKind, ResourceState, Subscription};

type ProviderResult<T> = std::result::Result<T, PowerMgmtError>;

// ── Operations ────────────────────────────────────────────────

/// State of a long-running start/stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Succeeded,
    InProgress,
    Failed,
}

impl OperationStatus {
    pub fn audit_result(&self) -> AuditResult {
        match self {
            OperationStatus::Succeeded => AuditResult::Succeeded,
            OperationStatus::InProgress => AuditResult::InProgress,
            OperationStatus::Failed => AuditResult::Failed,
        }
    }
}

/// Result of issuing a start or stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub status: OperationStatus,
    /// Opaque token to resume polling the operation from another process.
    pub continuation_token: Option<String>,
}

impl OperationHandle {
    pub fn succeeded() -> Self {
        Self {
            status: OperationStatus::Succeeded,
            continuation_token: None,
        }
    }

    pub fn in_progress(token: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::InProgress,
            continuation_token: Some(token.into()),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: OperationStatus::Failed,
            continuation_token: None,
        }
    }
}

// ── Listing ───────────────────────────────────────────────────

/// Tag predicate for resource listing: at least one of `any_of` present and
/// every `required` pair matching (values compared case-insensitively).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub any_of: Vec<String>,
    pub required: Vec<(String, String)>,
}

impl TagFilter {
    /// Resources carrying a schedule tag, plus any tags `kind` requires.
    pub fn for_kind(kind: ResourceKind) -> Self {
        Self {
            any_of: SCHEDULE_TAGS.iter().map(|t| t.to_string()).collect(),
            required: kind
                .required_tags()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn matches(&self, tags: &HashMap<String, String>) -> bool {
        let any = self.any_of.is_empty() || self.any_of.iter().any(|k| tags.contains_key(k));
        any && self.required.iter().all(|(k, v)| {
            tags.get(k).is_some_and(|actual| actual.eq_ignore_ascii_case(v))
        })
    }
}

// ── Providers ─────────────────────────────────────────────────

/// Power operations for one resource kind within one subscription.
#[async_trait]
pub trait PowerProvider: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Current state of a resource. Missing resources are
    /// [`PowerMgmtError::NotFound`].
    async fn get(&self, id: &ResourceId) -> ProviderResult<ResourceState>;

    async fn begin_start(&self, resource: &ResourceState, reason: &str) -> ProviderResult<OperationHandle>;

    async fn begin_stop(&self, resource: &ResourceState, reason: &str) -> ProviderResult<OperationHandle>;

    /// Wait up to `timeout` for an in-flight start to finish.
    async fn poll_start(
        &self,
        resource: &ResourceState,
        continuation_token: Option<&str>,
        timeout: Duration,
    ) -> ProviderResult<OperationStatus>;

    async fn poll_stop(
        &self,
        resource: &ResourceState,
        continuation_token: Option<&str>,
        timeout: Duration,
    ) -> ProviderResult<OperationStatus>;

    async fn list_tagged(&self, filter: &TagFilter) -> ProviderResult<Vec<ResourceState>>;

    /// Merge `tags` into the resource's tags. `Ok(false)` when the provider
    /// accepted the call but the update did not apply.
    async fn add_tags(&self, resource: &ResourceState, tags: HashMap<String, String>) -> ProviderResult<bool>;

    fn is_startable(&self, resource: &ResourceState) -> bool {
        resource.is_startable()
    }

    fn is_stoppable(&self, resource: &ResourceState) -> bool {
        resource.is_stoppable()
    }
}

pub trait ProviderFactory: Send + Sync {
    fn provider(&self, subscription_id: &str, kind: ResourceKind) -> ProviderResult<Arc<dyn PowerProvider>>;
}

// ── Alerts ────────────────────────────────────────────────────

/// Toggles the processing rule that silences a resource's alert actions.
#[async_trait]
pub trait AlertSuppressor: Send + Sync {
    async fn set_suppressed(
        &self,
        resource: &ResourceId,
        rule_name: &str,
        alert_ids: &[String],
        suppressed: bool,
    ) -> ProviderResult<()>;
}

#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn alerts_for_subscription(&self, subscription_id: &str) -> ProviderResult<Vec<AlertRule>>;
}

// ── Directory ─────────────────────────────────────────────────

#[async_trait]
pub trait SubscriptionDirectory: Send + Sync {
    async fn get_subscription(&self, subscription_id: &str) -> ProviderResult<Option<Subscription>>;

    async fn subscriptions_in_management_group(&self, management_group_id: &str)
        -> ProviderResult<Vec<Subscription>>;
}

/// Resolves the virtual machines covered by a maintenance run.
#[async_trait]
pub trait MaintenanceRunSource: Send + Sync {
    async fn vm_ids_for_run(&self, correlation_id: &str) -> ProviderResult<Vec<String>>;
}

// ── Timer state ───────────────────────────────────────────────

/// When the timer trigger last fanned out. Must survive restarts so a tick
/// after downtime evaluates the whole gap.
#[async_trait]
pub trait TickStore: Send + Sync {
    async fn last_tick(&self) -> ProviderResult<Option<DateTime<Utc>>>;

    async fn record_tick(&self, at: DateTime<Utc>) -> ProviderResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use powermgmt_core::tags::{TAG_FEATURE_SUBTYPE, TAG_POWER_OFF, TAG_SCHEDULE};

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn vm_filter_needs_a_schedule_tag() {
        let filter = TagFilter::for_kind(ResourceKind::VirtualMachine);
        assert!(filter.matches(&tags(&[(TAG_SCHEDULE, "alwayson")])));
        assert!(filter.matches(&tags(&[(TAG_POWER_OFF, "")])));
        assert!(!filter.matches(&tags(&[("env", "dev")])));
    }

    #[test]
    fn sftp_filter_requires_feature_tag() {
        let filter = TagFilter::for_kind(ResourceKind::StorageSftp);
        assert!(!filter.matches(&tags(&[(TAG_SCHEDULE, "alwaysoff")])));
        assert!(filter.matches(&tags(&[(TAG_SCHEDULE, "alwaysoff"), (TAG_FEATURE_SUBTYPE, "SFTP")])));
        assert!(!filter.matches(&tags(&[(TAG_SCHEDULE, "alwaysoff"), (TAG_FEATURE_SUBTYPE, "blob")])));
    }

    #[test]
    fn handle_constructors() {
        assert_eq!(OperationHandle::succeeded().status, OperationStatus::Succeeded);
        let handle = OperationHandle::in_progress("tok");
        assert_eq!(handle.continuation_token.as_deref(), Some("tok"));
        assert_eq!(OperationStatus::InProgress.audit_result(), AuditResult::InProgress);
    }
}
