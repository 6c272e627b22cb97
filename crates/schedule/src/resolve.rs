//! Schedule tag resolution types and tag value helpers.

use std::fmt;

use powermgmt_core::tags::{TAG_POWER_OFF, TAG_POWER_ON};
use powermgmt_core::PowerActionKind;

use crate::cron::{is_valid_cron, CronExpr};
use crate::error::Result;
use crate::grid::{grid_to_cron, is_valid_grid};

/// Which way a schedule moves the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    PowerOn,
    PowerOff,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::PowerOn => Direction::PowerOff,
            Direction::PowerOff => Direction::PowerOn,
        }
    }

    pub fn tag_key(&self) -> &'static str {
        match self {
            Direction::PowerOn => TAG_POWER_ON,
            Direction::PowerOff => TAG_POWER_OFF,
        }
    }

    pub fn action(&self) -> PowerActionKind {
        match self {
            Direction::PowerOn => PowerActionKind::Start,
            Direction::PowerOff => PowerActionKind::Stop,
        }
    }

    /// Verb used in decision logs.
    pub fn event_description(&self) -> &'static str {
        self.action().event_description()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_key())
    }
}

/// Cron expressions in effect for the current local day.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CronPair {
    pub power_on: Option<CronExpr>,
    pub power_off: Option<CronExpr>,
    /// Preset the pair came from, if any.
    pub preset: Option<&'static str>,
    /// Holiday that suppressed the power-on side.
    pub holiday: Option<String>,
}

impl CronPair {
    pub fn get(&self, direction: Direction) -> Option<&CronExpr> {
        match direction {
            Direction::PowerOn => self.power_on.as_ref(),
            Direction::PowerOff => self.power_off.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.power_on.is_none() && self.power_off.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidScheduleTag {
    pub key: &'static str,
    pub value: String,
    /// Text written back to the resource's status tag.
    pub message: String,
}

impl InvalidScheduleTag {
    pub fn new(resource_type: &str, name: &str, key: &'static str, value: &str) -> Self {
        Self {
            key,
            value: value.to_string(),
            message: format!("{resource_type} {name} has invalid tag value '{value}' for {key}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptOutReason {
    Exempt,
    NoSchedule,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleResolution {
    Resolved(CronPair),
    OptedOut(OptOutReason),
    Invalid(InvalidScheduleTag),
}

/// A `PowerOn`/`PowerOff` value is either a cron expression or a weekday grid.
pub fn is_valid_tag_value(value: &str) -> bool {
    is_valid_cron(value) || is_valid_grid(value)
}

/// Cron for a validated tag value on the day at `weekday_index` (Monday = 0).
pub fn tag_value_to_cron(value: &str, weekday_index: u32) -> Result<Option<CronExpr>> {
    if is_valid_grid(value) {
        return grid_to_cron(value, weekday_index)?
            .map(|expr| CronExpr::parse(&expr))
            .transpose();
    }
    CronExpr::parse(value).map(Some)
}
