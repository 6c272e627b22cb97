//! Weekday time-grids: `"8,8,8,8,8,-,-"` style per-day schedules.
//!
//! A grid has seven comma-separated slots, Monday first. Each slot is `-` or
//! `*` for "no action that day", or a time `H`, `HH`, `H:MM` or `HH:MM`.

use chrono::Weekday;

use crate::error::{Result, ScheduleError};

pub const GRID_SLOTS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridSlot {
    NoAction,
    At { hour: u32, minute: u32 },
}

impl GridSlot {
    fn parse(slot: &str) -> Option<Self> {
        if slot == "-" || slot == "*" {
            return Some(GridSlot::NoAction);
        }

        let (hour, minute) = match slot.split_once(':') {
            Some((h, m)) => (h, Some(m)),
            None => (slot, None),
        };

        if hour.is_empty() || hour.len() > 2 || !hour.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let hour: u32 = hour.parse().ok()?;
        if hour > 23 {
            return None;
        }

        let minute = match minute {
            None => 0,
            Some(m) if m.len() == 2 && m.bytes().all(|b| b.is_ascii_digit()) => {
                let m: u32 = m.parse().ok()?;
                if m > 59 {
                    return None;
                }
                m
            }
            Some(_) => return None,
        };

        Some(GridSlot::At { hour, minute })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekdayGrid {
    slots: [GridSlot; GRID_SLOTS],
}

impl WeekdayGrid {
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || ScheduleError::InvalidGrid(value.to_string());
        let parts: Vec<&str> = value.trim().split(',').collect();
        if parts.len() != GRID_SLOTS {
            return Err(invalid());
        }

        let mut slots = [GridSlot::NoAction; GRID_SLOTS];
        for (slot, part) in slots.iter_mut().zip(parts) {
            *slot = GridSlot::parse(part).ok_or_else(invalid)?;
        }
        Ok(Self { slots })
    }

    pub fn slot(&self, weekday: Weekday) -> GridSlot {
        self.slots[weekday.num_days_from_monday() as usize]
    }

    /// Single-occurrence cron for the day at `weekday_index` (Monday = 0),
    /// or `None` when that day has no action.
    pub fn cron_for(&self, weekday_index: u32) -> Result<Option<String>> {
        let slot = self
            .slots
            .get(weekday_index as usize)
            .ok_or(ScheduleError::InvalidWeekday(weekday_index))?;
        Ok(match slot {
            GridSlot::NoAction => None,
            GridSlot::At { hour, minute } => {
                Some(format!("{minute} {hour} * * {}", (weekday_index + 1) % 7))
            }
        })
    }
}

pub fn is_valid_grid(value: &str) -> bool {
    WeekdayGrid::parse(value).is_ok()
}

pub fn grid_to_cron(grid: &str, weekday_index: u32) -> Result<Option<String>> {
    WeekdayGrid::parse(grid)?.cron_for(weekday_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_each_weekday() {
        let grid = "8,8:30,-,07:05,*,10,23:59";
        assert_eq!(grid_to_cron(grid, 0).unwrap().as_deref(), Some("0 8 * * 1"));
        assert_eq!(grid_to_cron(grid, 1).unwrap().as_deref(), Some("30 8 * * 2"));
        assert_eq!(grid_to_cron(grid, 2).unwrap(), None);
        assert_eq!(grid_to_cron(grid, 3).unwrap().as_deref(), Some("5 7 * * 4"));
        assert_eq!(grid_to_cron(grid, 4).unwrap(), None);
        assert_eq!(grid_to_cron(grid, 5).unwrap().as_deref(), Some("0 10 * * 6"));
        // Sunday wraps to 0.
        assert_eq!(grid_to_cron(grid, 6).unwrap().as_deref(), Some("59 23 * * 0"));
    }

    #[test]
    fn rejects_bad_grids() {
        for grid in [
            "",
            "8,8,8,8,8,8",
            "8,8,8,8,8,8,8,8",
            "24,-,-,-,-,-,-",
            "8:5,-,-,-,-,-,-",
            "8:60,-,-,-,-,-,-",
            "008,-,-,-,-,-,-",
            "8:300,-,-,-,-,-,-",
            "8 ,-,-,-,-,-,-",
            "a,-,-,-,-,-,-",
            "8,,-,-,-,-,-",
            "0 8 * * 1",
        ] {
            assert!(!is_valid_grid(grid), "{grid:?} should be invalid");
        }
    }

    #[test]
    fn accepts_single_and_double_digit_hours() {
        assert!(is_valid_grid("0,00,9,09,9:00,09:00,-"));
        assert!(is_valid_grid("-,-,-,-,-,-,-"));
    }

    #[test]
    fn weekday_index_out_of_range() {
        assert!(matches!(
            grid_to_cron("8,8,8,8,8,-,-", 7),
            Err(ScheduleError::InvalidWeekday(7))
        ));
    }

    #[test]
    fn slot_by_weekday() {
        let grid = WeekdayGrid::parse("8,-,-,-,-,-,17:45").unwrap();
        assert_eq!(grid.slot(Weekday::Mon), GridSlot::At { hour: 8, minute: 0 });
        assert_eq!(grid.slot(Weekday::Tue), GridSlot::NoAction);
        assert_eq!(grid.slot(Weekday::Sun), GridSlot::At { hour: 17, minute: 45 });
    }
}
