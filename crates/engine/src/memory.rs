//! In-process collaborators backing tests and dry runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use powermgmt_alerts::AlertRule;
use powermgmt_core::{PowerMgmtError, ResourceId, ResourceKind, ResourceState, Subscription};

use crate::provider::{
    AlertSource, AlertSuppressor, MaintenanceRunSource, OperationHandle, OperationStatus,
    PowerProvider, ProviderFactory, SubscriptionDirectory, TagFilter, TickStore,
};

type ProviderResult<T> = std::result::Result<T, PowerMgmtError>;

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Power state a resource settles in after a start or stop.
fn settled_state(kind: ResourceKind, start: bool) -> &'static str {
    match (kind, start) {
        (ResourceKind::VirtualMachine, true) | (ResourceKind::ApplicationGateway, true) => "running",
        (ResourceKind::VirtualMachine, false) => "deallocated",
        (ResourceKind::ApplicationGateway, false) => "stopped",
        (ResourceKind::PostgresFlexibleServer, true) => "ready",
        (ResourceKind::PostgresFlexibleServer, false) => "stopped",
        (ResourceKind::StorageSftp, true) => "enabled",
        (ResourceKind::StorageSftp, false) => "disabled",
    }
}

// ── Fleet ─────────────────────────────────────────────────────

/// A provider call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Get(String),
    BeginStart(String),
    BeginStop(String),
    PollStart(String),
    PollStop(String),
    AddTags(String, HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct PendingOperation {
    resource_id: String,
    start: bool,
    /// In-progress polls left before the operation completes.
    remaining: u32,
}

#[derive(Default)]
struct FleetState {
    resources: HashMap<String, ResourceState>,
    operations: HashMap<String, PendingOperation>,
    calls: Vec<ProviderCall>,
    /// In-progress polls before a new operation completes; zero completes
    /// operations as soon as they are issued.
    polls_to_complete: u32,
    fail_operations: bool,
    tag_failures: u32,
    contention: u32,
}

/// Shared resource store behind every [`InMemoryProvider`].
#[derive(Default)]
pub struct InMemoryFleet {
    state: Mutex<FleetState>,
}

impl InMemoryFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: impl IntoIterator<Item = ResourceState>) -> Self {
        let fleet = Self::new();
        for resource in resources {
            fleet.insert(resource);
        }
        fleet
    }

    pub fn insert(&self, resource: ResourceState) {
        locked(&self.state)
            .resources
            .insert(resource.id.to_lowercase(), resource);
    }

    pub fn resource(&self, id: &str) -> Option<ResourceState> {
        locked(&self.state).resources.get(&id.to_lowercase()).cloned()
    }

    pub fn resources(&self) -> Vec<ResourceState> {
        let mut all: Vec<_> = locked(&self.state).resources.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Operations report in-progress for `polls` polls, then succeed.
    pub fn set_polls_to_complete(&self, polls: u32) {
        locked(&self.state).polls_to_complete = polls;
    }

    /// Reject every start and stop.
    pub fn set_fail_operations(&self, fail: bool) {
        locked(&self.state).fail_operations = fail;
    }

    /// The next `count` tag writes report not applied.
    pub fn fail_tag_writes(&self, count: u32) {
        locked(&self.state).tag_failures = count;
    }

    /// The next `count` starts or stops fail with "operation in progress".
    pub fn contend(&self, count: u32) {
        locked(&self.state).contention = count;
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        locked(&self.state).calls.clone()
    }

    fn begin(&self, kind: ResourceKind, resource: &ResourceState, start: bool) -> ProviderResult<OperationHandle> {
        let mut state = locked(&self.state);
        let key = resource.id.to_lowercase();
        state.calls.push(if start {
            ProviderCall::BeginStart(resource.id.clone())
        } else {
            ProviderCall::BeginStop(resource.id.clone())
        });

        if state.contention > 0 {
            state.contention -= 1;
            return Err(PowerMgmtError::OperationInProgress(resource.id.clone()));
        }
        if state.fail_operations {
            return Ok(OperationHandle::failed());
        }
        if !state.resources.contains_key(&key) {
            return Err(PowerMgmtError::NotFound(resource.id.clone()));
        }

        if state.polls_to_complete == 0 {
            if let Some(r) = state.resources.get_mut(&key) {
                r.power_state = settled_state(kind, start).to_string();
            }
            return Ok(OperationHandle::succeeded());
        }

        let token = format!("op-{}", Uuid::new_v4());
        let remaining = state.polls_to_complete;
        state.operations.insert(
            token.clone(),
            PendingOperation {
                resource_id: key,
                start,
                remaining,
            },
        );
        Ok(OperationHandle::in_progress(token))
    }

    fn poll(&self, kind: ResourceKind, resource: &ResourceState, start: bool, token: Option<&str>) -> ProviderResult<OperationStatus> {
        let mut state = locked(&self.state);
        state.calls.push(if start {
            ProviderCall::PollStart(resource.id.clone())
        } else {
            ProviderCall::PollStop(resource.id.clone())
        });

        let token = token.ok_or_else(|| PowerMgmtError::Provider("missing continuation token".into()))?;
        let op = state
            .operations
            .get_mut(token)
            .ok_or_else(|| PowerMgmtError::Provider(format!("unknown operation {token}")))?;

        if op.remaining > 0 {
            op.remaining -= 1;
            return Ok(OperationStatus::InProgress);
        }

        let (resource_id, op_start) = (op.resource_id.clone(), op.start);
        state.operations.remove(token);
        if let Some(r) = state.resources.get_mut(&resource_id) {
            r.power_state = settled_state(kind, op_start).to_string();
        }
        Ok(OperationStatus::Succeeded)
    }
}

// ── Providers ─────────────────────────────────────────────────

pub struct InMemoryProvider {
    fleet: Arc<InMemoryFleet>,
    subscription_id: String,
    kind: ResourceKind,
}

impl InMemoryProvider {
    pub fn new(fleet: Arc<InMemoryFleet>, subscription_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            fleet,
            subscription_id: subscription_id.into(),
            kind,
        }
    }

    fn in_scope(&self, resource: &ResourceState) -> bool {
        resource.kind == self.kind
            && ResourceId::parse(&resource.id)
                .is_ok_and(|id| id.subscription_id().eq_ignore_ascii_case(&self.subscription_id))
    }
}

#[async_trait]
impl PowerProvider for InMemoryProvider {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn get(&self, id: &ResourceId) -> ProviderResult<ResourceState> {
        let mut state = locked(&self.fleet.state);
        state.calls.push(ProviderCall::Get(id.to_string()));
        state
            .resources
            .get(&id.as_str().to_lowercase())
            .filter(|r| r.kind == self.kind)
            .cloned()
            .ok_or_else(|| PowerMgmtError::NotFound(id.to_string()))
    }

    async fn begin_start(&self, resource: &ResourceState, reason: &str) -> ProviderResult<OperationHandle> {
        debug!(resource = %resource.name(), reason, "In-memory start");
        self.fleet.begin(self.kind, resource, true)
    }

    async fn begin_stop(&self, resource: &ResourceState, reason: &str) -> ProviderResult<OperationHandle> {
        debug!(resource = %resource.name(), reason, "In-memory stop");
        self.fleet.begin(self.kind, resource, false)
    }

    async fn poll_start(
        &self,
        resource: &ResourceState,
        continuation_token: Option<&str>,
        _timeout: Duration,
    ) -> ProviderResult<OperationStatus> {
        self.fleet.poll(self.kind, resource, true, continuation_token)
    }

    async fn poll_stop(
        &self,
        resource: &ResourceState,
        continuation_token: Option<&str>,
        _timeout: Duration,
    ) -> ProviderResult<OperationStatus> {
        self.fleet.poll(self.kind, resource, false, continuation_token)
    }

    async fn list_tagged(&self, filter: &TagFilter) -> ProviderResult<Vec<ResourceState>> {
        let mut matched: Vec<_> = locked(&self.fleet.state)
            .resources
            .values()
            .filter(|r| self.in_scope(r) && filter.matches(&r.tags))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }

    async fn add_tags(&self, resource: &ResourceState, tags: HashMap<String, String>) -> ProviderResult<bool> {
        let mut state = locked(&self.fleet.state);
        state.calls.push(ProviderCall::AddTags(resource.id.clone(), tags.clone()));
        if state.tag_failures > 0 {
            state.tag_failures -= 1;
            return Ok(false);
        }
        match state.resources.get_mut(&resource.id.to_lowercase()) {
            Some(r) => {
                r.tags.extend(tags);
                Ok(true)
            }
            None => Err(PowerMgmtError::NotFound(resource.id.clone())),
        }
    }
}

#[derive(Clone)]
pub struct InMemoryFactory {
    fleet: Arc<InMemoryFleet>,
}

impl InMemoryFactory {
    pub fn new(fleet: Arc<InMemoryFleet>) -> Self {
        Self { fleet }
    }
}

impl ProviderFactory for InMemoryFactory {
    fn provider(&self, subscription_id: &str, kind: ResourceKind) -> ProviderResult<Arc<dyn PowerProvider>> {
        Ok(Arc::new(InMemoryProvider::new(self.fleet.clone(), subscription_id, kind)))
    }
}

// ── Alerts ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionCall {
    pub resource_id: String,
    pub rule_name: String,
    pub alert_ids: Vec<String>,
    pub suppressed: bool,
}

/// Alert inventory and suppression log.
#[derive(Default)]
pub struct InMemoryAlerts {
    rules: Vec<AlertRule>,
    calls: Mutex<Vec<SuppressionCall>>,
}

impl InMemoryAlerts {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SuppressionCall> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl AlertSource for InMemoryAlerts {
    async fn alerts_for_subscription(&self, subscription_id: &str) -> ProviderResult<Vec<AlertRule>> {
        let prefix = format!("/subscriptions/{}", subscription_id.to_lowercase());
        Ok(self
            .rules
            .iter()
            .filter(|rule| rule.scopes.iter().any(|s| s.to_lowercase().starts_with(&prefix)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AlertSuppressor for InMemoryAlerts {
    async fn set_suppressed(
        &self,
        resource: &ResourceId,
        rule_name: &str,
        alert_ids: &[String],
        suppressed: bool,
    ) -> ProviderResult<()> {
        locked(&self.calls).push(SuppressionCall {
            resource_id: resource.to_string(),
            rule_name: rule_name.to_string(),
            alert_ids: alert_ids.to_vec(),
            suppressed,
        });
        Ok(())
    }
}

// ── Directory ─────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryDirectory {
    subscriptions: Vec<Subscription>,
    management_groups: HashMap<String, Vec<String>>,
}

impl InMemoryDirectory {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self {
            subscriptions,
            management_groups: HashMap::new(),
        }
    }

    pub fn with_management_group(mut self, id: impl Into<String>, subscription_ids: Vec<String>) -> Self {
        self.management_groups.insert(id.into(), subscription_ids);
        self
    }
}

#[async_trait]
impl SubscriptionDirectory for InMemoryDirectory {
    async fn get_subscription(&self, subscription_id: &str) -> ProviderResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(subscription_id))
            .cloned())
    }

    async fn subscriptions_in_management_group(&self, management_group_id: &str) -> ProviderResult<Vec<Subscription>> {
        let ids = self
            .management_groups
            .get(management_group_id)
            .ok_or_else(|| PowerMgmtError::NotFound(format!("management group {management_group_id}")))?;
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| ids.iter().any(|id| id.eq_ignore_ascii_case(&s.id)))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryMaintenanceRuns {
    runs: HashMap<String, Vec<String>>,
}

impl InMemoryMaintenanceRuns {
    pub fn new(runs: HashMap<String, Vec<String>>) -> Self {
        Self { runs }
    }
}

#[async_trait]
impl MaintenanceRunSource for InMemoryMaintenanceRuns {
    async fn vm_ids_for_run(&self, correlation_id: &str) -> ProviderResult<Vec<String>> {
        Ok(self.runs.get(correlation_id).cloned().unwrap_or_default())
    }
}

/// Tick store that lives as long as the process.
#[derive(Default)]
pub struct InMemoryTickStore {
    last: Mutex<Option<DateTime<Utc>>>,
}

#[async_trait]
impl TickStore for InMemoryTickStore {
    async fn last_tick(&self) -> ProviderResult<Option<DateTime<Utc>>> {
        Ok(*locked(&self.last))
    }

    async fn record_tick(&self, at: DateTime<Utc>) -> ProviderResult<()> {
        *locked(&self.last) = Some(at);
        Ok(())
    }
}
