use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, DurationRound, TimeDelta, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use powermgmt_core::config::ScheduleConfig;
use powermgmt_core::tags::{TAG_POWER_OFF, TAG_POWER_ON, TAG_SCHEDULE};
use powermgmt_core::{AuditEvent, AuditResult, ResourceState};

use crate::calendar::HolidayCalendar;
use crate::cron::CronExpr;
use crate::preset::PresetTable;
use crate::resolve::{
    is_valid_tag_value, tag_value_to_cron, CronPair, Direction, InvalidScheduleTag, OptOutReason,
    ScheduleResolution,
};

// ── Fire decisions ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireReason {
    Actioning,
    /// The opposing direction fired more recently.
    OverriddenByOpposing,
    AfterNow,
    /// The occurrence predates the previous tick and was already handled.
    HandledPriorToLastCheck,
    NoOccurrence,
}

impl fmt::Display for FireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FireReason::Actioning => "actioning",
            FireReason::OverriddenByOpposing => "overridden by opposing event",
            FireReason::AfterNow => "after now",
            FireReason::HandledPriorToLastCheck => "handled prior to last check",
            FireReason::NoOccurrence => "no previous occurrence",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireDecision {
    pub fire: bool,
    pub reason: FireReason,
    /// Most recent occurrence of the evaluated cron.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Most recent occurrence of the opposing cron, when one was consulted.
    pub opposing: Option<DateTime<Utc>>,
    /// Previous tick, rounded down to the minute.
    pub last_check: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

impl FireDecision {
    /// Human-readable explanation in local time.
    pub fn describe(&self, direction: Direction, tz: Tz) -> String {
        let local = |t: DateTime<Utc>| t.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string();
        let desc = direction.event_description();
        let scheduled = self.scheduled_for.map(local).unwrap_or_default();
        match self.reason {
            FireReason::Actioning => format!("Actioning {desc} for scheduled time {scheduled}"),
            FireReason::OverriddenByOpposing => format!(
                "More recent {} event ({}) overrides this {desc} event ({scheduled})",
                direction.opposite().event_description(),
                self.opposing.map(local).unwrap_or_default()
            ),
            FireReason::AfterNow => format!(
                "Current {desc} event ({scheduled}) is after now ({})",
                local(self.now)
            ),
            FireReason::HandledPriorToLastCheck => format!(
                "Most recent {desc} event ({scheduled}) was handled prior to last check ({})",
                local(self.last_check)
            ),
            FireReason::NoOccurrence => format!("No previous {desc} event"),
        }
    }
}

// ── Evaluator ─────────────────────────────────────────────────

/// Resolves schedule tags and makes fire/no-fire decisions in the business
/// time zone.
#[derive(Clone)]
pub struct ScheduleEvaluator {
    timezone: Tz,
    country: String,
    presets: PresetTable,
    calendar: Arc<dyn HolidayCalendar>,
}

impl ScheduleEvaluator {
    pub fn new(
        timezone: Tz,
        country: impl Into<String>,
        presets: PresetTable,
        calendar: Arc<dyn HolidayCalendar>,
    ) -> Self {
        Self {
            timezone,
            country: country.into(),
            presets,
            calendar,
        }
    }

    pub fn from_config(cfg: &ScheduleConfig, calendar: Arc<dyn HolidayCalendar>) -> Self {
        Self::new(
            cfg.timezone,
            cfg.holiday_country.clone(),
            PresetTable::new(cfg.always_off_delay),
            calendar,
        )
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Holiday name for the local date of `now`.
    pub fn holiday(&self, now: DateTime<Utc>) -> Option<String> {
        let date = now.with_timezone(&self.timezone).date_naive();
        self.calendar.holiday_name(&self.country, date)
    }

    /// Resolve a resource's schedule tags to the crons in effect today.
    ///
    /// Never fails: invalid tag values come back as
    /// [`ScheduleResolution::Invalid`] for the caller to report.
    pub fn resolve(&self, resource: &ResourceState, now: DateTime<Utc>) -> ScheduleResolution {
        let invalid = |key: &'static str, value: &str| {
            let invalid = InvalidScheduleTag::new(resource.resource_type(), resource.name(), key, value);
            warn!(resource_id = %resource.id, key, value, "Invalid schedule tag");
            ScheduleResolution::Invalid(invalid)
        };

        let mut preset_name = None;
        let mut holiday = None;
        let (power_on, power_off) = match resource.tag(TAG_SCHEDULE) {
            Some(name) => {
                let Some(preset) = self.presets.lookup(name) else {
                    return invalid(TAG_SCHEDULE, name);
                };
                preset_name = Some(preset.name);
                let mut power_on = preset.power_on;
                if preset.ignore_holidays && power_on.is_some() {
                    if let Some(name) = self.holiday(now) {
                        info!(
                            resource = %resource.name(),
                            holiday = %name,
                            "Ignoring power on, public holiday"
                        );
                        power_on = None;
                        holiday = Some(name);
                    }
                }
                (power_on, preset.power_off)
            }
            None => {
                let power_off = resource.non_empty_tag(TAG_POWER_OFF).map(str::trim);
                let power_on = resource.non_empty_tag(TAG_POWER_ON).map(str::trim);
                if let Some(value) = power_off.filter(|v| !is_valid_tag_value(v)) {
                    return invalid(TAG_POWER_OFF, value);
                }
                if let Some(value) = power_on.filter(|v| !is_valid_tag_value(v)) {
                    return invalid(TAG_POWER_ON, value);
                }
                (power_on.map(str::to_string), power_off.map(str::to_string))
            }
        };

        debug!(
            resource_id = %resource.id,
            power_state = %resource.power_state,
            power_off = power_off.as_deref().unwrap_or("-"),
            power_on = power_on.as_deref().unwrap_or("-"),
            "Found scheduled resource"
        );

        let opt_out = if resource.is_exempt() {
            Some(OptOutReason::Exempt)
        } else if power_on.is_none() && power_off.is_none() {
            Some(OptOutReason::NoSchedule)
        } else {
            None
        };
        if let Some(reason) = opt_out {
            info!(
                resource_type = %resource.resource_type(),
                resource_id = %resource.id,
                "{} {} opts out of power management",
                resource.resource_type(),
                resource.id
            );
            return ScheduleResolution::OptedOut(reason);
        }

        let weekday = now.with_timezone(&self.timezone).weekday().num_days_from_monday();
        let to_cron = |key: &'static str, value: Option<String>| match value {
            None => Ok(None),
            Some(v) => match tag_value_to_cron(&v, weekday) {
                Ok(cron) => {
                    if cron.is_none() {
                        info!(resource = %resource.name(), key, value = %v, weekday, "No action for today");
                    }
                    Ok(cron)
                }
                Err(_) => Err(invalid(key, &v)),
            },
        };

        let power_off = match to_cron(TAG_POWER_OFF, power_off) {
            Ok(c) => c,
            Err(resolution) => return resolution,
        };
        let power_on = match to_cron(TAG_POWER_ON, power_on) {
            Ok(c) => c,
            Err(resolution) => return resolution,
        };

        ScheduleResolution::Resolved(CronPair {
            power_on,
            power_off,
            preset: preset_name,
            holiday,
        })
    }

    /// Whether `cron` fires on this tick.
    ///
    /// Fires iff `last_check <= prev <= now`, where `prev` is the most recent
    /// occurrence and `last_check` is rounded down to the minute (epoch when
    /// unknown). A firing event is suppressed when the opposing cron's most
    /// recent occurrence is later.
    pub fn should_fire(
        &self,
        last_check: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        cron: &CronExpr,
        opposing: Option<&CronExpr>,
    ) -> FireDecision {
        let last_check = last_check
            .map(|t| t.duration_trunc(TimeDelta::minutes(1)).unwrap_or(t))
            .unwrap_or(DateTime::UNIX_EPOCH);

        let mut decision = FireDecision {
            fire: false,
            reason: FireReason::NoOccurrence,
            scheduled_for: None,
            opposing: None,
            last_check,
            now,
        };

        let Some(prev) = cron.previous(now, self.timezone) else {
            return decision;
        };
        decision.scheduled_for = Some(prev);

        if prev > now {
            decision.reason = FireReason::AfterNow;
            return decision;
        }
        if prev < last_check {
            decision.reason = FireReason::HandledPriorToLastCheck;
            return decision;
        }

        if let Some(opposing) = opposing {
            decision.opposing = opposing.previous(now, self.timezone);
            if decision.opposing.is_some_and(|o| o > prev) {
                decision.reason = FireReason::OverriddenByOpposing;
                return decision;
            }
        }

        decision.fire = true;
        decision.reason = FireReason::Actioning;
        decision
    }

    /// Decide one direction for a resource and record the `croncheck` audit
    /// event. `None` when the pair has no cron for `direction`.
    pub fn check(
        &self,
        resource: &ResourceState,
        direction: Direction,
        pair: &CronPair,
        last_check: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        correlation_id: &str,
    ) -> Option<FireDecision> {
        let cron = pair.get(direction)?;
        let opposing = pair.get(direction.opposite());
        let decision = self.should_fire(last_check, now, cron, opposing);

        AuditEvent::new("croncheck", resource)
            .result(AuditResult::Succeeded)
            .field(direction.event_description(), cron.as_str())
            .field(
                direction.opposite().event_description(),
                opposing.map(CronExpr::as_str),
            )
            .field("debug", decision.describe(direction, self.timezone))
            .field("actioning", decision.fire)
            .field("invocationId", correlation_id)
            .emit();

        Some(decision)
    }
}
