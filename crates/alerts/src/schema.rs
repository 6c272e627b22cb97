use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A metric alert rule as returned by the alert inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    /// Resource id prefixes the rule applies to.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Optional `allOf`/`anyOf`/`field`-`equals` condition tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,
}

impl AlertRule {
    pub fn new(id: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            id: id.into(),
            scopes,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: serde_json::Value) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Parse a JSON array of rules.
    pub fn list_from_json(s: &str) -> Result<Vec<AlertRule>> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rule_list() {
        let rules = AlertRule::list_from_json(
            r#"[
                {"id": "a1", "scopes": ["/subscriptions/s1"]},
                {"id": "a2", "scopes": [], "condition": {"field": "resourceGroup", "equals": "rg"}}
            ]"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules[0].condition.is_none());
        assert!(rules[1].condition.is_some());
    }

    #[test]
    fn missing_fields_default() {
        let rules = AlertRule::list_from_json(r#"[{"id": "a1"}]"#).unwrap();
        assert!(rules[0].scopes.is_empty());
    }
}
