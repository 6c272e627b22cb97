//! Standard 5-field cron expressions.
//!
//! The `cron` crate wants 6 fields (leading seconds), numbers day-of-week
//! from 1 = Sunday and ANDs day-of-month with day-of-week. Tag values use the
//! standard dialect: 0 or 7 = Sunday, and when both day fields are restricted
//! a time matches if either one does. Expressions are parsed here, expanded to
//! explicit value lists and handed to the crate in a form where both dialects
//! agree.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ::cron::Schedule;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::error::{Result, ScheduleError};

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Widening windows (hours) searched for the most recent occurrence. The last
/// covers a Feb 29 schedule.
const LOOKBACK_HOURS: [i64; 6] = [1, 24, 24 * 8, 24 * 32, 24 * 367, 24 * (366 * 4 + 1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl FieldKind {
    const ORDER: [FieldKind; 5] = [
        FieldKind::Minute,
        FieldKind::Hour,
        FieldKind::DayOfMonth,
        FieldKind::Month,
        FieldKind::DayOfWeek,
    ];

    fn name(&self) -> &'static str {
        match self {
            FieldKind::Minute => "minute",
            FieldKind::Hour => "hour",
            FieldKind::DayOfMonth => "day-of-month",
            FieldKind::Month => "month",
            FieldKind::DayOfWeek => "day-of-week",
        }
    }

    fn bounds(&self) -> (u32, u32) {
        match self {
            FieldKind::Minute => (0, 59),
            FieldKind::Hour => (0, 23),
            FieldKind::DayOfMonth => (1, 31),
            FieldKind::Month => (1, 12),
            FieldKind::DayOfWeek => (0, 7),
        }
    }

    fn value(&self, token: &str) -> Option<u32> {
        if let Ok(v) = token.parse::<u32>() {
            let (min, max) = self.bounds();
            return (min..=max).contains(&v).then_some(v);
        }
        let upper = token.to_ascii_uppercase();
        match self {
            FieldKind::Month => MONTH_NAMES
                .iter()
                .position(|n| *n == upper)
                .map(|i| i as u32 + 1),
            FieldKind::DayOfWeek => DAY_NAMES.iter().position(|n| *n == upper).map(|i| i as u32),
            _ => None,
        }
    }
}

/// One parsed field: the set of matching values.
#[derive(Debug, Clone)]
struct Field {
    values: BTreeSet<u32>,
    /// Field text starts with `*`; such a day field does not restrict the
    /// day match.
    star: bool,
    /// The field is exactly `*`.
    any: bool,
}

fn parse_field(text: &str, kind: FieldKind) -> std::result::Result<Field, String> {
    let invalid = || format!("invalid {} field '{}'", kind.name(), text);
    let (min, max) = kind.bounds();
    let mut values = BTreeSet::new();

    for part in text.split(',') {
        if part.is_empty() {
            return Err(invalid());
        }

        let (range, step) = match part.split_once('/') {
            Some((r, s)) => match s.parse::<u32>() {
                Ok(v) if v > 0 => (r, Some(v)),
                _ => return Err(invalid()),
            },
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            if kind == FieldKind::DayOfWeek {
                (0, 6)
            } else {
                (min, max)
            }
        } else if let Some((s, e)) = range.split_once('-') {
            match (kind.value(s), kind.value(e)) {
                (Some(s), Some(e)) if s <= e => (s, e),
                _ => return Err(invalid()),
            }
        } else {
            let v = kind.value(range).ok_or_else(invalid)?;
            // `N/step` runs from N to the end of the range.
            if step.is_some() {
                (v, max)
            } else {
                (v, v)
            }
        };

        let step = step.unwrap_or(1) as usize;
        for v in (start..=end).step_by(step) {
            // 7 is Sunday too.
            let v = if kind == FieldKind::DayOfWeek && v == 7 { 0 } else { v };
            values.insert(v);
        }
    }

    Ok(Field {
        values,
        star: text.starts_with('*'),
        any: text == "*",
    })
}

fn render(field: &Field, kind: FieldKind) -> String {
    if field.any {
        return "*".to_string();
    }
    let parts: Vec<String> = match kind {
        FieldKind::DayOfWeek => field
            .values
            .iter()
            .map(|v| DAY_NAMES[*v as usize].to_string())
            .collect(),
        _ => field.values.iter().map(u32::to_string).collect(),
    };
    parts.join(",")
}

/// A validated 5-field cron expression.
#[derive(Debug, Clone)]
pub struct CronExpr {
    source: String,
    /// One schedule, or two when both day fields are restricted (OR semantics).
    schedules: Vec<Schedule>,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let source = expr.trim().to_string();
        let invalid = |reason: String| ScheduleError::InvalidCron {
            expr: source.clone(),
            reason,
        };

        let tokens: Vec<&str> = source.split_whitespace().collect();
        if tokens.len() != 5 {
            return Err(invalid(format!(
                "expected 5 fields (min hour dom month dow), got {}",
                tokens.len()
            )));
        }

        let mut fields = Vec::with_capacity(5);
        for (token, kind) in tokens.iter().zip(FieldKind::ORDER) {
            fields.push(parse_field(token, kind).map_err(&invalid)?);
        }
        let [minute, hour, dom, month, dow] = [
            render(&fields[0], FieldKind::Minute),
            render(&fields[1], FieldKind::Hour),
            render(&fields[2], FieldKind::DayOfMonth),
            render(&fields[3], FieldKind::Month),
            render(&fields[4], FieldKind::DayOfWeek),
        ];

        let specs = if !fields[2].star && !fields[4].star {
            vec![
                format!("0 {minute} {hour} {dom} {month} *"),
                format!("0 {minute} {hour} * {month} {dow}"),
            ]
        } else {
            vec![format!("0 {minute} {hour} {dom} {month} {dow}")]
        };

        let schedules = specs
            .iter()
            .map(|src| Schedule::from_str(src).map_err(|e| invalid(e.to_string())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { source, schedules })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The most recent occurrence at or before `now`, evaluated in `tz`.
    pub fn previous(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let now_local = now.with_timezone(&tz);
        for hours in LOOKBACK_HOURS {
            let from = now_local - Duration::hours(hours);
            let latest = self
                .schedules
                .iter()
                .filter_map(|s| s.after(&from).take_while(|t| *t <= now_local).last())
                .max();
            if let Some(t) = latest {
                return Some(t.with_timezone(&Utc));
            }
        }
        None
    }

    /// The next occurrence strictly after `now`, evaluated in `tz`.
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let now_local = now.with_timezone(&tz);
        self.schedules
            .iter()
            .filter_map(|s| s.after(&now_local).next())
            .min()
            .map(|t| t.with_timezone(&Utc))
    }
}

impl PartialEq for CronExpr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for CronExpr {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

pub fn is_valid_cron(expr: &str) -> bool {
    CronExpr::parse(expr).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Pacific::Auckland;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Auckland
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn accepts_standard_fields() {
        for expr in [
            "0 8 * * 1,2,3,4,5",
            "*/15 * * * *",
            "0 */4 * * *",
            "30 7 1-15 JAN-MAR mon-fri",
            "5/10 0 * * 7",
            "0 0 * * 0-7/2",
        ] {
            assert!(is_valid_cron(expr), "{expr} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expr in [
            "",
            "0 8 * *",
            "0 0 8 * * 1",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "* * * * 5-1",
            "*/0 * * * *",
            "a b c d e",
            "1,,2 * * * *",
        ] {
            assert!(!is_valid_cron(expr), "{expr} should be invalid");
        }
    }

    #[test]
    fn day_of_week_zero_and_seven_are_sunday() {
        // 2025-01-12 is a Sunday.
        let now = local(2025, 1, 12, 9, 30);
        for expr in ["0 9 * * 0", "0 9 * * 7", "0 9 * * SUN"] {
            let cron = CronExpr::parse(expr).unwrap();
            assert_eq!(cron.previous(now, Auckland), Some(local(2025, 1, 12, 9, 0)), "{expr}");
        }
    }

    #[test]
    fn weekday_list_skips_the_weekend() {
        let cron = CronExpr::parse("0 18 * * 1,2,3,4,5").unwrap();
        // Sunday 2025-01-12 10:00 -> most recent is Friday 18:00.
        let prev = cron.previous(local(2025, 1, 12, 10, 0), Auckland);
        assert_eq!(prev, Some(local(2025, 1, 10, 18, 0)));
    }

    #[test]
    fn previous_includes_now() {
        let cron = CronExpr::parse("0 18 * * *").unwrap();
        let now = local(2025, 1, 13, 18, 0);
        assert_eq!(cron.previous(now, Auckland), Some(now));
    }

    #[test]
    fn restricted_day_fields_match_either() {
        // 1st of the month OR Monday.
        let cron = CronExpr::parse("0 6 1 * 1").unwrap();
        // Wed 2025-01-15: previous Monday is 2025-01-13.
        assert_eq!(
            cron.previous(local(2025, 1, 15, 12, 0), Auckland),
            Some(local(2025, 1, 13, 6, 0))
        );
        // Thu 2025-05-01 is the 1st but not a Monday.
        assert_eq!(
            cron.previous(local(2025, 5, 1, 7, 0), Auckland),
            Some(local(2025, 5, 1, 6, 0))
        );
    }

    #[test]
    fn sparse_schedules_are_found() {
        let cron = CronExpr::parse("0 0 1 1 *").unwrap();
        assert_eq!(
            cron.previous(local(2025, 11, 20, 0, 0), Auckland),
            Some(local(2025, 1, 1, 0, 0))
        );
    }

    #[test]
    fn impossible_dates_have_no_occurrence() {
        let cron = CronExpr::parse("0 0 31 2 *").unwrap();
        assert_eq!(cron.previous(local(2025, 3, 1, 0, 0), Auckland), None);
    }

    #[test]
    fn next_after_is_strict() {
        let cron = CronExpr::parse("0 8 * * *").unwrap();
        let now = local(2025, 1, 13, 8, 0);
        assert_eq!(cron.next_after(now, Auckland), Some(local(2025, 1, 14, 8, 0)));
    }
}
