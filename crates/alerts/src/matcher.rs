use tracing::debug;

use powermgmt_core::ResourceId;

use crate::condition::{evaluate_condition, Criteria};
use crate::schema::AlertRule;

/// Ids of the alert rules that apply to a resource: a scope is a
/// (case-insensitive) prefix of the resource id and the condition, if any,
/// holds. Rules with unparsable conditions never match.
pub fn matching_alert_ids(alerts: &[AlertRule], resource_id: &str, resource_type: &str) -> Vec<String> {
    let id_folded = resource_id.to_lowercase();
    let parsed = ResourceId::parse(resource_id).ok();
    let criteria = Criteria {
        resource_group: parsed.as_ref().map(ResourceId::resource_group),
        resource_id: Some(resource_id),
        resource_type: Some(resource_type),
    };

    alerts
        .iter()
        .filter(|alert| {
            alert
                .scopes
                .iter()
                .any(|scope| !scope.is_empty() && id_folded.starts_with(&scope.to_lowercase()))
        })
        .filter(|alert| match &alert.condition {
            None => true,
            Some(expr) => match evaluate_condition(expr, &criteria) {
                Ok(matched) => matched,
                Err(e) => {
                    debug!(alert_id = %alert.id, error = %e, "Could not parse alert condition");
                    false
                }
            },
        })
        .map(|alert| alert.id.clone())
        .collect()
}

/// Name of the processing rule that silences action groups for a resource.
pub fn suppression_rule_name(resource_name: &str) -> String {
    format!("AzAPR_{resource_name}_disableactiongroup")
}
