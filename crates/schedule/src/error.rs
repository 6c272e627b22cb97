use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("invalid weekday grid '{0}'")]
    InvalidGrid(String),

    #[error("invalid weekday index {0}, expected 0 (Monday) to 6 (Sunday)")]
    InvalidWeekday(u32),

    #[error("no built-in holidays for country '{0}'; set HOLIDAY_FILE")]
    NoHolidayCalendar(String),

    #[error("holiday file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("holiday file parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
