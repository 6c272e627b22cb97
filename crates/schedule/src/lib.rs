//! Schedule tag evaluation.
//!
//! Turns the `Schedule` / `PowerOn` / `PowerOff` tags on a resource into cron
//! expressions for the current local day and decides whether each direction
//! should fire on this evaluation tick.

pub mod calendar;
pub mod cron;
pub mod error;
pub mod evaluator;
pub mod grid;
pub mod preset;
pub mod resolve;

pub use calendar::{load_calendar, Holiday, HolidayCalendar, NoHolidays, NzHolidays, StaticHolidayCalendar};
pub use crate::cron::CronExpr;
pub use error::ScheduleError;
pub use evaluator::{FireDecision, FireReason, ScheduleEvaluator};
pub use grid::{grid_to_cron, is_valid_grid, GridSlot, WeekdayGrid};
pub use preset::{Preset, PresetTable};
pub use resolve::{CronPair, Direction, InvalidScheduleTag, OptOutReason, ScheduleResolution};
