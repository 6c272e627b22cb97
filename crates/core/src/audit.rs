//! Structured per-resource audit events.
//!
//! Events are emitted as a single JSON document on the `powermgmt::audit`
//! tracing target. Reporting queries parse these documents, so field names
//! are stable.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::resource::ResourceState;

pub const AUDIT_TARGET: &str = "powermgmt::audit";

/// Outcome recorded on an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Succeeded,
    InProgress,
    Failed,
    Timeout,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::Succeeded => "succeeded",
            AuditResult::InProgress => "inprogress",
            AuditResult::Failed => "failed",
            AuditResult::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event: String,
    pub resource_id: String,
    pub resource_name: String,
    pub power_state: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub result: Option<AuditResult>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(event: &str, resource: &ResourceState) -> Self {
        Self {
            event: event.to_string(),
            resource_id: resource.id.clone(),
            resource_name: resource.name().to_string(),
            power_state: resource.power_state.clone(),
            resource_type: resource.resource_type().to_string(),
            result: None,
            details: Map::new(),
        }
    }

    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Attach a detail field. Values that fail to serialize are recorded as null.
    pub fn field(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"event\":\"{}\"}}", self.event))
    }

    pub fn emit(self) {
        tracing::info!(
            target: AUDIT_TARGET,
            event = %self.event,
            resource_id = %self.resource_id,
            result = self.result.map(|r| r.as_str()).unwrap_or("-"),
            "{}",
            self.to_json()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    #[test]
    fn renders_stable_field_names() {
        let resource = ResourceState::new(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1",
            ResourceKind::VirtualMachine,
            Some("running"),
        );
        let event = AuditEvent::new("croncheck", &resource)
            .result(AuditResult::Succeeded)
            .field("actioning", true)
            .field("PowerOff", "0 18 * * 1-5");

        let value: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["event"], "croncheck");
        assert_eq!(value["resourceName"], "vm1");
        assert_eq!(value["powerState"], "running");
        assert_eq!(value["type"], "microsoft.compute/virtualmachines");
        assert_eq!(value["result"], "succeeded");
        assert_eq!(value["actioning"], true);
        assert_eq!(value["PowerOff"], "0 18 * * 1-5");
    }

    #[test]
    fn in_progress_serializes_without_separator() {
        assert_eq!(
            serde_json::to_string(&AuditResult::InProgress).unwrap(),
            "\"inprogress\""
        );
    }
}
