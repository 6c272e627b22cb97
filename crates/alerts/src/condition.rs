//! Alert condition evaluation.
//!
//! A condition is a boolean literal, an `allOf` / `anyOf` list of
//! conditions, or a leaf `{"field": ..., "equals": ...}` compared
//! case-insensitively against the resource. Evaluation is lazy: a branch
//! that is never reached is never parsed.

use serde_json::Value;

use crate::error::{AlertError, Result};

/// The resource attributes a condition can test.
#[derive(Debug, Clone, Copy, Default)]
pub struct Criteria<'a> {
    pub resource_group: Option<&'a str>,
    pub resource_id: Option<&'a str>,
    pub resource_type: Option<&'a str>,
}

impl Criteria<'_> {
    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "resourceGroup" => self.resource_group,
            "resourceId" => self.resource_id,
            "resourceType" => self.resource_type,
            _ => None,
        }
    }
}

fn unparsable(expr: &Value) -> AlertError {
    AlertError::UnparsableCondition(expr.to_string())
}

fn sub_conditions(expr: &Value) -> Result<&Vec<Value>> {
    expr.as_array().ok_or_else(|| unparsable(expr))
}

/// Evaluate `expr` for `criteria`. Unknown leaf fields evaluate to false.
pub fn evaluate_condition(expr: &Value, criteria: &Criteria<'_>) -> Result<bool> {
    if let Value::Bool(b) = expr {
        return Ok(*b);
    }

    let Value::Object(map) = expr else {
        return Err(unparsable(expr));
    };

    if let Some(all) = map.get("allOf") {
        for sub in sub_conditions(all)? {
            if !evaluate_condition(sub, criteria)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }

    if let Some(any) = map.get("anyOf") {
        for sub in sub_conditions(any)? {
            if evaluate_condition(sub, criteria)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    let field = map.get("field").and_then(Value::as_str).filter(|s| !s.is_empty());
    let equals = map.get("equals").and_then(Value::as_str).filter(|s| !s.is_empty());
    match (field, equals) {
        (Some(field), Some(equals)) if map.len() == 2 => Ok(criteria
            .field(field)
            .is_some_and(|actual| actual.to_lowercase() == equals.to_lowercase())),
        _ => Err(unparsable(expr)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn criteria() -> Criteria<'static> {
        Criteria {
            resource_group: Some("rg1"),
            resource_id: Some(
                "/subscriptions/s1/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/vm1",
            ),
            resource_type: Some("Microsoft.Compute/virtualMachines"),
        }
    }

    #[test]
    fn literals() {
        assert!(evaluate_condition(&json!(true), &criteria()).unwrap());
        assert!(!evaluate_condition(&json!(false), &criteria()).unwrap());
    }

    #[test]
    fn leaf_equality_is_case_insensitive() {
        let expr = json!({"field": "resourceGroup", "equals": "RG1"});
        assert!(evaluate_condition(&expr, &criteria()).unwrap());
        let expr = json!({"field": "resourceType", "equals": "microsoft.compute/virtualmachines"});
        assert!(evaluate_condition(&expr, &criteria()).unwrap());
        let expr = json!({"field": "resourceGroup", "equals": "rg2"});
        assert!(!evaluate_condition(&expr, &criteria()).unwrap());
    }

    #[test]
    fn unknown_fields_are_false() {
        let expr = json!({"field": "location", "equals": "australiaeast"});
        assert!(!evaluate_condition(&expr, &criteria()).unwrap());
    }

    #[test]
    fn missing_criteria_are_false() {
        let expr = json!({"field": "resourceGroup", "equals": "rg1"});
        assert!(!evaluate_condition(&expr, &Criteria::default()).unwrap());
    }

    #[test]
    fn all_of_and_any_of() {
        let expr = json!({"allOf": [
            {"field": "resourceGroup", "equals": "RG1"},
            {"anyOf": [
                {"field": "resourceType", "equals": "microsoft.sql/servers"},
                {"field": "resourceType", "equals": "microsoft.compute/virtualmachines"}
            ]}
        ]});
        assert!(evaluate_condition(&expr, &criteria()).unwrap());

        assert!(evaluate_condition(&json!({"allOf": []}), &criteria()).unwrap());
        assert!(!evaluate_condition(&json!({"anyOf": []}), &criteria()).unwrap());
    }

    #[test]
    fn malformed_shapes_are_unparsable() {
        for expr in [
            json!({"field": "resourceGroup"}),
            json!({"field": "resourceGroup", "equals": ""}),
            json!({"field": "resourceGroup", "equals": "rg1", "extra": 1}),
            json!({"field": "resourceGroup", "equals": 5}),
            json!({"allOf": "nope"}),
            json!("text"),
            json!(3),
            json!(null),
        ] {
            assert!(
                matches!(evaluate_condition(&expr, &criteria()), Err(AlertError::UnparsableCondition(_))),
                "{expr}"
            );
        }
    }

    #[test]
    fn short_circuit_skips_unreached_branches() {
        let expr = json!({"anyOf": [true, {"bogus": 1}]});
        assert!(evaluate_condition(&expr, &criteria()).unwrap());
        let expr = json!({"allOf": [false, {"bogus": 1}]});
        assert!(!evaluate_condition(&expr, &criteria()).unwrap());
    }
}
