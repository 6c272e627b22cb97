//! Alert rule matching: which metric alerts would fire for a resource.

pub mod condition;
pub mod error;
pub mod matcher;
pub mod schema;

pub use condition::{evaluate_condition, Criteria};
pub use error::AlertError;
pub use matcher::{matching_alert_ids, suppression_rule_name};
pub use schema::AlertRule;
