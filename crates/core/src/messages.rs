//! Queue message payloads.
//!
//! Every message is self-contained: a handler needs nothing but the message
//! body and the resource's current tags to make progress.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PowerMgmtError, Result};

// ── Power actions ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerActionKind {
    Start,
    StartForUpdates,
    Stop,
    StopPostUpdates,
}

impl PowerActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerActionKind::Start => "start",
            PowerActionKind::StartForUpdates => "start_for_updates",
            PowerActionKind::Stop => "stop",
            PowerActionKind::StopPostUpdates => "stop_post_updates",
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, PowerActionKind::Start | PowerActionKind::StartForUpdates)
    }

    /// Verb recorded on scan audit events.
    pub fn event_description(&self) -> &'static str {
        if self.is_start() {
            "start"
        } else {
            "deallocate"
        }
    }
}

impl fmt::Display for PowerActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to change one resource's power state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerAction {
    /// Full resource id.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    pub action: PowerActionKind,
    pub created_at: DateTime<Utc>,
    /// Alert rules to suppress around a stop (and re-enable after a start).
    #[serde(default)]
    pub alert_ids: Vec<String>,
    /// 1 on the first attempt.
    #[serde(default = "first_attempt")]
    pub attempt_num: u32,
}

fn first_attempt() -> u32 {
    1
}

impl PowerAction {
    pub fn new(
        id: impl Into<String>,
        sub_type: Option<&str>,
        action: PowerActionKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sub_type: sub_type.map(str::to_string),
            action,
            created_at,
            alert_ids: Vec::new(),
            attempt_num: first_attempt(),
        }
    }

    pub fn with_alert_ids(mut self, alert_ids: Vec<String>) -> Self {
        self.alert_ids = alert_ids;
        self
    }
}

/// A "poll again later" continuation of an in-flight [`PowerAction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredCheck {
    #[serde(flatten)]
    pub action: PowerAction,
    /// Status text to write on completion; empty means no tag.
    #[serde(default)]
    pub tag_text: String,
    #[serde(default)]
    pub continuation_token: Option<String>,
    #[serde(default)]
    pub wait_retries: u32,
}

impl DeferredCheck {
    pub fn new(action: PowerAction, tag_text: Option<&str>, continuation_token: Option<String>) -> Self {
        Self {
            action,
            tag_text: tag_text.unwrap_or_default().to_string(),
            continuation_token,
            wait_retries: 0,
        }
    }

    pub fn pending_tag(&self) -> Option<&str> {
        Some(self.tag_text.as_str()).filter(|t| !t.is_empty())
    }
}

// ── Subscriptions ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub display_name: String,
    pub state: String,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        matches!(self.state.as_str(), "Active" | "Enabled")
    }
}

/// Scan request for one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCheck {
    pub id: String,
    pub display_name: String,
    pub state: String,
    /// Time of the previous evaluation tick.
    #[serde(default)]
    pub last_check: Option<String>,
}

impl SubscriptionCheck {
    pub fn for_subscription(sub: &Subscription, last_check: Option<DateTime<Utc>>) -> Self {
        Self {
            id: sub.id.clone(),
            display_name: sub.display_name.clone(),
            state: sub.state.clone(),
            last_check: last_check.map(|t| t.to_rfc3339()),
        }
    }

    /// Parse `last_check`. Accepts RFC 3339 or a naive timestamp taken as UTC.
    pub fn last_check_time(&self) -> Result<Option<DateTime<Utc>>> {
        match self.last_check.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_timestamp(raw).map(Some),
        }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(t.and_utc());
        }
    }
    Err(PowerMgmtError::InvalidTimestamp(raw.to_string()))
}

// ── Maintenance events ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceEvent {
    pub id: String,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub data: MaintenanceEventData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceEventData {
    #[serde(rename = "CorrelationId")]
    pub correlation_id: String,
}

impl MaintenanceEvent {
    pub fn is_pre_maintenance(&self) -> bool {
        self.event_type.contains("PreMaintenance")
    }
}
