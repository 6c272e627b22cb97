//! Resource identity, resource kinds and their pre-state predicates.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PowerMgmtError, Result};
use crate::tags;

// ── Resource ids ──────────────────────────────────────────────

/// A parsed cloud resource id of the form
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    raw: String,
    subscription_id: String,
    resource_group: String,
    resource_type: String,
    name: String,
}

impl ResourceId {
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.split('/').collect();
        // ["", "subscriptions", sub, "resourceGroups", rg, "providers", ns, type, name]
        if segments.len() < 9
            || !segments[1].eq_ignore_ascii_case("subscriptions")
            || !segments[3].eq_ignore_ascii_case("resourcegroups")
        {
            return Err(PowerMgmtError::InvalidResourceId(raw.to_string()));
        }

        let providers = segments
            .iter()
            .position(|s| s.eq_ignore_ascii_case("providers"))
            .ok_or_else(|| PowerMgmtError::InvalidResourceId(raw.to_string()))?;
        let name = segments[segments.len() - 1];
        if name.is_empty() || providers + 2 >= segments.len() {
            return Err(PowerMgmtError::InvalidResourceId(raw.to_string()));
        }
        let resource_type = segments[providers + 1..segments.len() - 1]
            .join("/")
            .to_lowercase();

        Ok(Self {
            raw: raw.to_string(),
            subscription_id: segments[2].to_string(),
            resource_group: segments[4].to_string(),
            resource_type,
            name: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// Lower-cased `{namespace}/{type}`, e.g. `microsoft.compute/virtualmachines`.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ── Resource kinds ────────────────────────────────────────────

pub const TYPE_VIRTUAL_MACHINE: &str = "microsoft.compute/virtualmachines";
pub const TYPE_APPLICATION_GATEWAY: &str = "microsoft.network/applicationgateways";
pub const TYPE_POSTGRES_FLEXIBLE_SERVER: &str = "microsoft.dbforpostgresql/flexibleservers";
pub const TYPE_STORAGE_ACCOUNT: &str = "microsoft.storage/storageaccounts";

/// Sub-type discriminator for the storage account SFTP feature.
pub const SUB_TYPE_SFTP: &str = "sftp";

/// The resource types that can be power managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    VirtualMachine,
    ApplicationGateway,
    PostgresFlexibleServer,
    StorageSftp,
}

/// When the status audit tag may be written around a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTagPolicy {
    /// Write the tag once the stop has completed.
    OnCompletion,
    /// Write the tag before issuing the stop; the stop itself changes state
    /// that would clobber a later write.
    BeforeStop,
    /// Never write tags around a stop; a tag write reprovisions the resource.
    Skip,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::VirtualMachine,
        ResourceKind::ApplicationGateway,
        ResourceKind::PostgresFlexibleServer,
        ResourceKind::StorageSftp,
    ];

    /// Resolve a kind from a resource type string and optional sub-type.
    pub fn resolve(resource_type: &str, sub_type: Option<&str>) -> Result<Self> {
        let resource_type = resource_type.to_lowercase();
        match (resource_type.as_str(), sub_type) {
            (TYPE_VIRTUAL_MACHINE, _) => Ok(ResourceKind::VirtualMachine),
            (TYPE_APPLICATION_GATEWAY, _) => Ok(ResourceKind::ApplicationGateway),
            (TYPE_POSTGRES_FLEXIBLE_SERVER, _) => Ok(ResourceKind::PostgresFlexibleServer),
            (TYPE_STORAGE_ACCOUNT, Some(s)) if s.eq_ignore_ascii_case(SUB_TYPE_SFTP) => {
                Ok(ResourceKind::StorageSftp)
            }
            _ => Err(PowerMgmtError::UnsupportedResourceType(match sub_type {
                Some(s) => format!("{resource_type} ({s})"),
                None => resource_type,
            })),
        }
    }

    /// Short feature name used by `TYPES_ENABLED`.
    pub fn feature_name(&self) -> &'static str {
        match self {
            ResourceKind::VirtualMachine => "vm",
            ResourceKind::ApplicationGateway => "agw",
            ResourceKind::PostgresFlexibleServer => "psql",
            ResourceKind::StorageSftp => "sftp",
        }
    }

    pub fn from_feature_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.feature_name().eq_ignore_ascii_case(name))
    }

    pub fn resource_type(&self) -> &'static str {
        match self {
            ResourceKind::VirtualMachine => TYPE_VIRTUAL_MACHINE,
            ResourceKind::ApplicationGateway => TYPE_APPLICATION_GATEWAY,
            ResourceKind::PostgresFlexibleServer => TYPE_POSTGRES_FLEXIBLE_SERVER,
            ResourceKind::StorageSftp => TYPE_STORAGE_ACCOUNT,
        }
    }

    /// Sub-type carried on power actions for this kind.
    pub fn sub_type(&self) -> Option<&'static str> {
        match self {
            ResourceKind::StorageSftp => Some(SUB_TYPE_SFTP),
            _ => None,
        }
    }

    /// Tags (key, value) a resource must carry in addition to a schedule tag
    /// to be picked up for this kind.
    pub fn required_tags(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            ResourceKind::StorageSftp => vec![(tags::TAG_FEATURE_SUBTYPE, SUB_TYPE_SFTP)],
            _ => Vec::new(),
        }
    }

    pub fn is_running(&self, power_state: &str) -> bool {
        let state = power_state.to_lowercase();
        match self {
            ResourceKind::VirtualMachine | ResourceKind::ApplicationGateway => {
                matches!(state.as_str(), "running" | "starting")
            }
            ResourceKind::PostgresFlexibleServer => state == "ready",
            ResourceKind::StorageSftp => state == "enabled",
        }
    }

    /// Whether a start can safely be issued from `power_state`.
    ///
    /// Database servers only start from a fully stopped state; start/stop are
    /// slow and unsafe to re-issue mid-transition.
    pub fn is_startable(&self, power_state: &str) -> bool {
        match self {
            ResourceKind::PostgresFlexibleServer => power_state.eq_ignore_ascii_case("stopped"),
            _ => !self.is_running(power_state),
        }
    }

    /// Whether a stop can safely be issued from `power_state`.
    pub fn is_stoppable(&self, power_state: &str) -> bool {
        self.is_running(power_state)
    }

    pub fn stop_tag_policy(&self) -> StopTagPolicy {
        match self {
            ResourceKind::PostgresFlexibleServer => StopTagPolicy::BeforeStop,
            ResourceKind::ApplicationGateway => StopTagPolicy::Skip,
            _ => StopTagPolicy::OnCompletion,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.feature_name())
    }
}

// ── Resource state ────────────────────────────────────────────

/// A snapshot of a resource as read from the provider.
///
/// The provider owns the canonical state; this is only ever read per
/// invocation and written back through tag updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub kind: ResourceKind,
    /// Lower-cased provider power state; `unknown` when not reported.
    #[serde(default = "unknown_power_state")]
    pub power_state: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

fn unknown_power_state() -> String {
    "unknown".to_string()
}

impl ResourceState {
    pub fn new(id: impl Into<String>, kind: ResourceKind, power_state: Option<&str>) -> Self {
        Self {
            id: id.into(),
            kind,
            power_state: power_state
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
                .unwrap_or_else(unknown_power_state),
            tags: HashMap::new(),
        }
    }

    pub fn with_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn resource_id(&self) -> Result<ResourceId> {
        ResourceId::parse(&self.id)
    }

    /// Last path segment of the id.
    pub fn name(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }

    pub fn resource_type(&self) -> &'static str {
        self.kind.resource_type()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Tag value, treating empty strings as absent.
    pub fn non_empty_tag(&self, key: &str) -> Option<&str> {
        self.tag(key).filter(|v| !v.trim().is_empty())
    }

    pub fn is_running(&self) -> bool {
        self.kind.is_running(&self.power_state)
    }

    pub fn is_startable(&self) -> bool {
        self.kind.is_startable(&self.power_state)
    }

    pub fn is_stoppable(&self) -> bool {
        self.kind.is_stoppable(&self.power_state)
    }

    pub fn is_exempt(&self) -> bool {
        self.non_empty_tag(tags::TAG_EXEMPT).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VM_ID: &str =
        "/subscriptions/sub-1/resourceGroups/RG1/providers/Microsoft.Compute/virtualMachines/vm-01";

    #[test]
    fn parse_resource_id() {
        let id = ResourceId::parse(VM_ID).unwrap();
        assert_eq!(id.subscription_id(), "sub-1");
        assert_eq!(id.resource_group(), "RG1");
        assert_eq!(id.resource_type(), TYPE_VIRTUAL_MACHINE);
        assert_eq!(id.name(), "vm-01");
        assert_eq!(id.to_string(), VM_ID);
    }

    #[test]
    fn parse_rejects_short_ids() {
        assert!(ResourceId::parse("/subscriptions/sub-1").is_err());
        assert!(ResourceId::parse("vm-01").is_err());
        assert!(ResourceId::parse("/foo/sub/resourceGroups/rg/providers/a/b/c").is_err());
    }

    #[test]
    fn resolve_kinds() {
        assert_eq!(
            ResourceKind::resolve("Microsoft.Compute/virtualMachines", None).unwrap(),
            ResourceKind::VirtualMachine
        );
        assert_eq!(
            ResourceKind::resolve(TYPE_STORAGE_ACCOUNT, Some("SFTP")).unwrap(),
            ResourceKind::StorageSftp
        );
        assert!(ResourceKind::resolve(TYPE_STORAGE_ACCOUNT, None).is_err());
        assert!(ResourceKind::resolve("microsoft.web/sites", None).is_err());
    }

    #[test]
    fn feature_names_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_feature_name(kind.feature_name()), Some(kind));
        }
        assert_eq!(ResourceKind::from_feature_name(" VM "), Some(ResourceKind::VirtualMachine));
        assert_eq!(ResourceKind::from_feature_name("bogus"), None);
    }

    #[test]
    fn vm_predicates() {
        let kind = ResourceKind::VirtualMachine;
        assert!(kind.is_stoppable("running"));
        assert!(kind.is_stoppable("Starting"));
        assert!(!kind.is_startable("running"));
        assert!(kind.is_startable("deallocated"));
        assert!(kind.is_startable("unknown"));
    }

    #[test]
    fn postgres_predicates_require_settled_states() {
        let kind = ResourceKind::PostgresFlexibleServer;
        assert!(kind.is_stoppable("ready"));
        assert!(!kind.is_stoppable("starting"));
        assert!(kind.is_startable("stopped"));
        assert!(!kind.is_startable("stopping"));
        assert!(!kind.is_startable("ready"));
    }

    #[test]
    fn stop_tag_policies() {
        assert_eq!(
            ResourceKind::PostgresFlexibleServer.stop_tag_policy(),
            StopTagPolicy::BeforeStop
        );
        assert_eq!(ResourceKind::ApplicationGateway.stop_tag_policy(), StopTagPolicy::Skip);
        assert_eq!(ResourceKind::VirtualMachine.stop_tag_policy(), StopTagPolicy::OnCompletion);
    }

    #[test]
    fn resource_state_defaults_unknown_power_state() {
        let state = ResourceState::new(VM_ID, ResourceKind::VirtualMachine, None);
        assert_eq!(state.power_state, "unknown");
        assert_eq!(state.name(), "vm-01");

        let state = ResourceState::new(VM_ID, ResourceKind::VirtualMachine, Some("Running"));
        assert_eq!(state.power_state, "running");
        assert!(state.is_running());
    }

    #[test]
    fn exemption_ignores_empty_values() {
        let state = ResourceState::new(VM_ID, ResourceKind::VirtualMachine, Some("running"))
            .with_tags([(tags::TAG_EXEMPT, "")]);
        assert!(!state.is_exempt());

        let state = state.with_tags([(tags::TAG_EXEMPT, "yes")]);
        assert!(state.is_exempt());
    }
}
