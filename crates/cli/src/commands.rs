//! Offline evaluation commands: schedules, grids, alert rules, config.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use powermgmt_alerts::{matching_alert_ids, suppression_rule_name, AlertRule};
use powermgmt_core::tags::{TAG_POWER_OFF, TAG_POWER_ON, TAG_SCHEDULE};
use powermgmt_core::{Config, ResourceId, ResourceKind, ResourceState};
use powermgmt_schedule::{grid_to_cron, Direction, HolidayCalendar, ScheduleEvaluator, ScheduleResolution};

use crate::cli::{AlertsArgs, CheckArgs, GridArgs};

/// Resource id used for schedules evaluated outside any fleet.
const SCRATCH_VM: &str = "/subscriptions/local/resourceGroups/local/providers/Microsoft.Compute/virtualMachines/scratch";

/// Parse RFC 3339, or a naive `YYYY-MM-DD HH:MM[:SS]` in the business time zone.
pub fn parse_time(raw: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .with_context(|| format!("unrecognised time '{raw}'"))?;
    match tz.from_local_datetime(&naive).earliest() {
        Some(t) => Ok(t.with_timezone(&Utc)),
        None => bail!("'{raw}' does not exist in {tz}"),
    }
}

pub fn time_or_now(raw: Option<&str>, tz: Tz) -> Result<DateTime<Utc>> {
    match raw {
        Some(raw) => parse_time(raw, tz),
        None => Ok(Utc::now()),
    }
}

// ── check ─────────────────────────────────────────────────────

pub fn check(config: &Config, calendar: Arc<dyn HolidayCalendar>, args: &CheckArgs) -> Result<()> {
    let tz = config.schedule.timezone;
    let now = time_or_now(args.at.as_deref(), tz)?;
    let last_check = match args.last_check.as_deref() {
        Some(raw) => parse_time(raw, tz)?,
        None => now - TimeDelta::minutes(i64::from(config.trigger.interval_minutes)),
    };

    let tags = [
        (TAG_SCHEDULE, &args.schedule),
        (TAG_POWER_ON, &args.power_on),
        (TAG_POWER_OFF, &args.power_off),
    ];
    let resource = ResourceState::new(SCRATCH_VM, ResourceKind::VirtualMachine, Some("unknown"))
        .with_tags(tags.iter().filter_map(|(k, v)| v.as_deref().map(|v| (*k, v))));
    if resource.tags.is_empty() {
        bail!("give at least one of --schedule, --power-on or --power-off");
    }

    let evaluator = ScheduleEvaluator::from_config(&config.schedule, calendar);
    println!("now:        {}", now.with_timezone(&tz));
    println!("last check: {}", last_check.with_timezone(&tz));

    let pair = match evaluator.resolve(&resource, now) {
        ScheduleResolution::Resolved(pair) => pair,
        ScheduleResolution::OptedOut(reason) => {
            println!("opted out:  {reason:?}");
            return Ok(());
        }
        ScheduleResolution::Invalid(invalid) => bail!("{}", invalid.message),
    };
    if let Some(preset) = pair.preset {
        println!("preset:     {preset}");
    }
    if let Some(holiday) = &pair.holiday {
        println!("holiday:    {holiday}");
    }

    for direction in [Direction::PowerOn, Direction::PowerOff] {
        let Some(cron) = pair.get(direction) else {
            println!("{:<11} (none)", format!("{}:", direction.tag_key()));
            continue;
        };
        let decision = evaluator.should_fire(Some(last_check), now, cron, pair.get(direction.opposite()));
        println!(
            "{:<11} {:<20} fire={:<5} {}",
            format!("{}:", direction.tag_key()),
            cron.as_str(),
            decision.fire,
            decision.describe(direction, tz)
        );
    }
    Ok(())
}

// ── grid ──────────────────────────────────────────────────────

pub fn grid(config: &Config, args: &GridArgs) -> Result<()> {
    let date = match args.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date '{raw}'"))?,
        None => Utc::now().with_timezone(&config.schedule.timezone).date_naive(),
    };
    let weekday = date.weekday();
    match grid_to_cron(&args.grid, weekday.num_days_from_monday())? {
        Some(cron) => println!("{date} ({weekday}): {cron}"),
        None => println!("{date} ({weekday}): no action"),
    }
    Ok(())
}

// ── alerts ────────────────────────────────────────────────────

pub fn alerts(args: &AlertsArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.rules)
        .with_context(|| format!("failed to read alert rules {}", args.rules.display()))?;
    let rules = AlertRule::list_from_json(&content).context("failed to parse alert rules")?;

    let id = ResourceId::parse(&args.resource_id)?;
    let resource_type = args.resource_type.as_deref().unwrap_or(id.resource_type());
    let matched = matching_alert_ids(&rules, id.as_str(), resource_type);

    println!("{} of {} rules match {}", matched.len(), rules.len(), id.name());
    for alert_id in &matched {
        println!("  {alert_id}");
    }
    if !matched.is_empty() {
        println!("suppression rule: {}", suppression_rule_name(id.name()));
    }
    Ok(())
}

// ── config ────────────────────────────────────────────────────

pub fn show_config(config: &Config) -> Result<()> {
    let summary = serde_json::to_string_pretty(&config.redacted_summary())?;
    println!("{summary}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Pacific::Auckland;

    #[test]
    fn test_parse_rfc3339() {
        let t = parse_time("2025-01-13T05:02:00Z", Auckland).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 1, 13, 5, 2, 0).unwrap());
    }

    #[test]
    fn test_parse_local_time_in_business_zone() {
        let t = parse_time("2025-01-13 18:02", Auckland).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 1, 13, 5, 2, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_time("monday evening", Auckland).is_err());
    }

    #[test]
    fn test_skipped_local_time_is_rejected() {
        // Clocks go forward from 02:00 to 03:00 on 2025-09-28 in Auckland.
        assert!(parse_time("2025-09-28 02:30", Auckland).is_err());
    }
}
