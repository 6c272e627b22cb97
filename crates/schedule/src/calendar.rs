//! Public holiday lookup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ScheduleError};

/// The calendar for `country`: the TOML list at `file` when given, otherwise
/// the built-in rules. A country with neither is a configuration error.
pub fn load_calendar(country: &str, file: Option<&Path>) -> Result<Arc<dyn HolidayCalendar>> {
    if let Some(path) = file {
        return Ok(Arc::new(StaticHolidayCalendar::load(path)?));
    }
    if country.eq_ignore_ascii_case(NzHolidays::COUNTRY) {
        info!(country, "Using built-in holiday calendar");
        return Ok(Arc::new(NzHolidays));
    }
    Err(ScheduleError::NoHolidayCalendar(country.to_string()))
}

/// "Is this local date a public holiday in `country`?"
pub trait HolidayCalendar: Send + Sync {
    /// Holiday name when `date` is a holiday.
    fn holiday_name(&self, country: &str, date: NaiveDate) -> Option<String>;
}

/// A calendar with no holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHolidays;

impl HolidayCalendar for NoHolidays {
    fn holiday_name(&self, _country: &str, _date: NaiveDate) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub country: String,
    pub date: NaiveDate,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct HolidayFile {
    #[serde(default, rename = "holiday")]
    holidays: Vec<Holiday>,
}

/// Holidays from a fixed list, typically loaded from a TOML file:
///
/// ```toml
/// [[holiday]]
/// country = "NZ"
/// date = "2025-12-25"
/// name = "Christmas Day"
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticHolidayCalendar {
    by_date: HashMap<(String, NaiveDate), String>,
}

impl StaticHolidayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = Holiday>) -> Self {
        let by_date = holidays
            .into_iter()
            .map(|h| ((h.country.to_uppercase(), h.date), h.name))
            .collect();
        Self { by_date }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: HolidayFile = toml::from_str(s)?;
        Ok(Self::new(file.holidays))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let calendar = Self::from_toml_str(&content)?;
        info!(path = %path.display(), count = calendar.len(), "Loaded holiday calendar");
        Ok(calendar)
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

impl HolidayCalendar for StaticHolidayCalendar {
    fn holiday_name(&self, country: &str, date: NaiveDate) -> Option<String> {
        self.by_date.get(&(country.to_uppercase(), date)).cloned()
    }
}

// ── New Zealand ───────────────────────────────────────────────

/// Matariki is fixed by statute per year rather than by rule.
const MATARIKI: &[(i32, u32, u32)] = &[
    (2022, 6, 24),
    (2023, 7, 14),
    (2024, 6, 28),
    (2025, 6, 20),
    (2026, 7, 10),
    (2027, 6, 25),
    (2028, 7, 14),
    (2029, 7, 6),
    (2030, 6, 21),
    (2031, 7, 11),
    (2032, 7, 2),
    (2033, 6, 24),
    (2034, 7, 7),
    (2035, 6, 29),
];

/// New Zealand national public holidays, including the weekday a weekend
/// holiday is observed on.
#[derive(Debug, Clone, Copy, Default)]
pub struct NzHolidays;

impl NzHolidays {
    pub const COUNTRY: &'static str = "NZ";

    pub fn for_year(year: i32) -> Option<Vec<(NaiveDate, String)>> {
        let ymd = |m, d| NaiveDate::from_ymd_opt(year, m, d);
        let mut days = Vec::new();

        observed_pair(&mut days, ymd(1, 1)?, "New Year's Day", "Day after New Year's Day")?;
        observed_single(&mut days, ymd(2, 6)?, "Waitangi Day")?;
        let easter = easter_sunday(year)?;
        days.push((easter.checked_sub_days(Days::new(2))?, "Good Friday".to_string()));
        days.push((easter.checked_add_days(Days::new(1))?, "Easter Monday".to_string()));
        observed_single(&mut days, ymd(4, 25)?, "ANZAC Day")?;
        days.push((
            NaiveDate::from_weekday_of_month_opt(year, 6, Weekday::Mon, 1)?,
            "King's Birthday".to_string(),
        ));
        if let Some(&(_, m, d)) = MATARIKI.iter().find(|(y, _, _)| *y == year) {
            days.push((ymd(m, d)?, "Matariki".to_string()));
        }
        days.push((
            NaiveDate::from_weekday_of_month_opt(year, 10, Weekday::Mon, 4)?,
            "Labour Day".to_string(),
        ));
        observed_pair(&mut days, ymd(12, 25)?, "Christmas Day", "Boxing Day")?;
        Some(days)
    }
}

impl HolidayCalendar for NzHolidays {
    fn holiday_name(&self, country: &str, date: NaiveDate) -> Option<String> {
        if !country.eq_ignore_ascii_case(Self::COUNTRY) {
            return None;
        }
        Self::for_year(date.year())?
            .into_iter()
            .find(|(day, _)| *day == date)
            .map(|(_, name)| name)
    }
}

fn observed(name: &str) -> String {
    format!("{name} (observed)")
}

/// A holiday falling on a weekend is observed the following Monday.
fn observed_single(days: &mut Vec<(NaiveDate, String)>, date: NaiveDate, name: &str) -> Option<()> {
    days.push((date, name.to_string()));
    let shift = match date.weekday() {
        Weekday::Sat => 2,
        Weekday::Sun => 1,
        _ => return Some(()),
    };
    days.push((date.checked_add_days(Days::new(shift))?, observed(name)));
    Some(())
}

/// Two consecutive holidays; weekend days move to the next free weekdays.
fn observed_pair(days: &mut Vec<(NaiveDate, String)>, first: NaiveDate, a: &str, b: &str) -> Option<()> {
    let after = |n| first.checked_add_days(Days::new(n));
    days.push((first, a.to_string()));
    days.push((after(1)?, b.to_string()));
    match first.weekday() {
        Weekday::Fri => days.push((after(3)?, observed(b))),
        Weekday::Sat => {
            days.push((after(2)?, observed(a)));
            days.push((after(3)?, observed(b)));
        }
        Weekday::Sun => days.push((after(2)?, observed(a))),
        _ => {}
    }
    Some(())
}

/// Gregorian Easter Sunday (anonymous algorithm).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
