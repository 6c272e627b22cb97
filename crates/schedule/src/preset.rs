//! Named schedule presets selected with the `Schedule` tag.

pub const BUSINESS_HOURS: &str = "businesshours";
pub const BUSINESS_HOURS_EXTENDED: &str = "businesshoursextended";
pub const ALWAYS_OFF: &str = "alwaysoff";
pub const ALWAYS_ON: &str = "alwayson";
pub const OFF_AT_MIDNIGHT: &str = "offatmidnight";
pub const NONE: &str = "none";

pub const PRESET_NAMES: [&str; 6] = [
    BUSINESS_HOURS,
    BUSINESS_HOURS_EXTENDED,
    ALWAYS_OFF,
    ALWAYS_ON,
    OFF_AT_MIDNIGHT,
    NONE,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub power_on: Option<String>,
    pub power_off: Option<String>,
    /// Skip the power-on side on public holidays.
    pub ignore_holidays: bool,
}

#[derive(Debug, Clone)]
pub struct PresetTable {
    always_off_delay: u32,
}

impl Default for PresetTable {
    fn default() -> Self {
        Self::new(4)
    }
}

impl PresetTable {
    pub fn new(always_off_delay: u32) -> Self {
        Self { always_off_delay }
    }

    /// Case-insensitive preset lookup.
    pub fn lookup(&self, name: &str) -> Option<Preset> {
        let name = name.trim().to_lowercase();
        let weekdays = |hour: u32| Some(format!("0 {hour} * * 1,2,3,4,5"));

        let (name, power_on, power_off, ignore_holidays) = match name.as_str() {
            BUSINESS_HOURS => (BUSINESS_HOURS, weekdays(8), weekdays(18), true),
            BUSINESS_HOURS_EXTENDED => (BUSINESS_HOURS_EXTENDED, weekdays(8), weekdays(22), false),
            ALWAYS_OFF => (
                ALWAYS_OFF,
                None,
                Some(format!("0 */{} * * *", self.always_off_delay)),
                false,
            ),
            ALWAYS_ON => (ALWAYS_ON, Some("0 * * * *".to_string()), None, false),
            OFF_AT_MIDNIGHT => (OFF_AT_MIDNIGHT, None, Some("0 0 * * *".to_string()), false),
            NONE => (NONE, None, None, false),
            _ => return None,
        };

        Some(Preset {
            name,
            power_on,
            power_off,
            ignore_holidays,
        })
    }
}
