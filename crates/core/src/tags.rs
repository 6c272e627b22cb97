//! Reserved tag vocabulary.
//!
//! Keys and audit status values are read by downstream reporting; their exact
//! wording is part of the external contract.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Name of a preset schedule.
pub const TAG_SCHEDULE: &str = "Schedule";
/// Cron expression or weekday grid for powering on.
pub const TAG_POWER_ON: &str = "PowerOn";
/// Cron expression or weekday grid for powering off.
pub const TAG_POWER_OFF: &str = "PowerOff";
/// Feature discriminator for resources whose "power" is a feature toggle.
pub const TAG_FEATURE_SUBTYPE: &str = "PowerMgmtFeature";
/// Any non-empty value opts the resource out of power management.
pub const TAG_EXEMPT: &str = "_POWERMGMT_EXEMPT_";
/// Audit status text written by the workflow.
pub const TAG_STATUS: &str = "_POWERMGMT_STATUS_";
/// Local time of the last audit status write.
pub const TAG_LAST_UPDATED: &str = "_POWERMGMT_LASTUPDATED_";

/// Tags that make a resource eligible for scanning.
pub const SCHEDULE_TAGS: [&str; 3] = [TAG_POWER_ON, TAG_POWER_OFF, TAG_SCHEDULE];

/// Audit status values written to [`TAG_STATUS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Started,
    StartIgnored,
    Stopped,
    StopIgnored,
    StartedForMaintenance,
    StopPending,
    InMaintenance,
    MaintenanceCompleted,
    StoppedPostMaintenance,
}

impl AuditStatus {
    pub const ALL: [AuditStatus; 9] = [
        AuditStatus::Started,
        AuditStatus::StartIgnored,
        AuditStatus::Stopped,
        AuditStatus::StopIgnored,
        AuditStatus::StartedForMaintenance,
        AuditStatus::StopPending,
        AuditStatus::InMaintenance,
        AuditStatus::MaintenanceCompleted,
        AuditStatus::StoppedPostMaintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Started => "Auto-started",
            AuditStatus::StartIgnored => "Auto-start ignored",
            AuditStatus::Stopped => "Auto-stopped",
            AuditStatus::StopIgnored => "Auto-stop ignored",
            AuditStatus::StartedForMaintenance => "In maintenance window (was stopped)",
            AuditStatus::StopPending => "In maintenance window (stop pending)",
            AuditStatus::InMaintenance => "In maintenance window",
            AuditStatus::MaintenanceCompleted => "Maintenance window completed",
            AuditStatus::StoppedPostMaintenance => "Auto-stopped (post maintenance)",
        }
    }

    /// Case-insensitive lookup of a tag value.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders the audit tag pair in the business time zone.
#[derive(Debug, Clone)]
pub struct AuditTagFormat {
    pub timezone: Tz,
    /// Literal suffix appended to the timestamp, e.g. `NZT`.
    pub suffix: String,
}

impl AuditTagFormat {
    pub fn new(timezone: Tz, suffix: impl Into<String>) -> Self {
        Self {
            timezone,
            suffix: suffix.into(),
        }
    }

    pub fn timestamp(&self, at: DateTime<Utc>) -> String {
        let local = at.with_timezone(&self.timezone);
        if self.suffix.is_empty() {
            local.format("%Y-%m-%d %H:%M:%S").to_string()
        } else {
            format!("{} {}", local.format("%Y-%m-%d %H:%M:%S"), self.suffix)
        }
    }

    /// The status + last-updated tag pair for `text`.
    pub fn tags(&self, text: &str, at: DateTime<Utc>) -> HashMap<String, String> {
        HashMap::from([
            (TAG_STATUS.to_string(), text.to_string()),
            (TAG_LAST_UPDATED.to_string(), self.timestamp(at)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_wording_is_stable() {
        assert_eq!(AuditStatus::Stopped.as_str(), "Auto-stopped");
        assert_eq!(
            AuditStatus::StartedForMaintenance.as_str(),
            "In maintenance window (was stopped)"
        );
        assert_eq!(
            AuditStatus::StoppedPostMaintenance.to_string(),
            "Auto-stopped (post maintenance)"
        );
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(
            AuditStatus::parse("in maintenance window (STOP PENDING)"),
            Some(AuditStatus::StopPending)
        );
        assert_eq!(AuditStatus::parse("something else"), None);
    }

    #[test]
    fn audit_tags_use_local_time() {
        let fmt = AuditTagFormat::new(chrono_tz::Pacific::Auckland, "NZT");
        // 2025-01-13 05:02:00 UTC is 18:02 NZDT (UTC+13).
        let at = Utc.with_ymd_and_hms(2025, 1, 13, 5, 2, 0).unwrap();
        let tags = fmt.tags("Auto-stopped", at);
        assert_eq!(tags[TAG_STATUS], "Auto-stopped");
        assert_eq!(tags[TAG_LAST_UPDATED], "2025-01-13 18:02:00 NZT");
    }
}
