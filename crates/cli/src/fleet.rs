use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use powermgmt_alerts::AlertRule;
use powermgmt_core::{Clock, Config, ResourceState, Subscription};
use powermgmt_engine::{
    Collaborators, InMemoryAlerts, InMemoryDirectory, InMemoryFactory, InMemoryFleet, InMemoryMaintenanceRuns,
};
use powermgmt_schedule::{load_calendar, HolidayCalendar};

/// A fleet snapshot for dry runs and staging consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetFile {
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub resources: Vec<ResourceState>,
    #[serde(default)]
    pub alerts: Vec<AlertRule>,
    /// Maintenance run correlation id -> affected VM ids.
    #[serde(default)]
    pub maintenance_runs: HashMap<String, Vec<String>>,
    /// Management group id -> subscription ids.
    #[serde(default)]
    pub management_groups: HashMap<String, Vec<String>>,
}

/// In-memory collaborators built from a [`FleetFile`], with handles kept
/// for inspection.
pub struct LoadedFleet {
    pub fleet: Arc<InMemoryFleet>,
    pub alerts: Arc<InMemoryAlerts>,
    pub collaborators: Collaborators,
}

impl FleetFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fleet file {}", path.display()))?;
        let file: FleetFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse fleet file {}", path.display()))?;
        info!(
            path = %path.display(),
            subscriptions = file.subscriptions.len(),
            resources = file.resources.len(),
            alerts = file.alerts.len(),
            "Loaded fleet file"
        );
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("failed to serialize fleet")?;
        std::fs::write(path, content).with_context(|| format!("failed to write fleet file {}", path.display()))
    }

    pub fn into_collaborators(self, calendar: Arc<dyn HolidayCalendar>, clock: Arc<dyn Clock>) -> LoadedFleet {
        let fleet = Arc::new(InMemoryFleet::with_resources(self.resources));
        let alerts = Arc::new(InMemoryAlerts::new(self.alerts));
        let mut directory = InMemoryDirectory::new(self.subscriptions);
        for (id, subscription_ids) in self.management_groups {
            directory = directory.with_management_group(id, subscription_ids);
        }

        let collaborators = Collaborators {
            providers: Arc::new(InMemoryFactory::new(fleet.clone())),
            suppressor: alerts.clone(),
            alerts: alerts.clone(),
            directory: Arc::new(directory),
            maintenance_runs: Arc::new(InMemoryMaintenanceRuns::new(self.maintenance_runs)),
            calendar,
            clock,
        };
        LoadedFleet {
            fleet,
            alerts,
            collaborators,
        }
    }
}

/// Holidays for the configured country, from `HOLIDAY_FILE` or built in.
pub fn holiday_calendar(config: &Config) -> Result<Arc<dyn HolidayCalendar>> {
    let schedule = &config.schedule;
    load_calendar(&schedule.holiday_country, schedule.holiday_file.as_deref())
        .with_context(|| format!("failed to load holidays for {}", schedule.holiday_country))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use chrono::Utc;
    use powermgmt_core::{FixedClock, ResourceKind};
    use powermgmt_schedule::NoHolidays;

    const FLEET: &str = r#"{
        "subscriptions": [{"id": "sub-1", "display_name": "Dev", "state": "Enabled"}],
        "resources": [{
            "id": "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm-01",
            "kind": "virtual_machine",
            "power_state": "running",
            "tags": {"Schedule": "businesshours"}
        }],
        "alerts": [{"id": "cpu-high", "scopes": ["/subscriptions/sub-1"]}],
        "maintenance_runs": {"run-1": ["/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm-01"]}
    }"#;

    #[test]
    fn test_load_fleet_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FLEET.as_bytes()).unwrap();

        let fleet = FleetFile::load(file.path()).unwrap();
        assert_eq!(fleet.subscriptions.len(), 1);
        assert_eq!(fleet.resources[0].kind, ResourceKind::VirtualMachine);
        assert_eq!(fleet.resources[0].tag("Schedule"), Some("businesshours"));
        assert_eq!(fleet.alerts[0].id, "cpu-high");
        assert!(fleet.management_groups.is_empty());
    }

    #[test]
    fn test_missing_fleet_file_names_path() {
        let err = FleetFile::load(Path::new("/nonexistent/fleet.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/fleet.json"));
    }

    #[test]
    fn test_save_keeps_resources() {
        let fleet: FleetFile = serde_json::from_str(FLEET).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        fleet.save(&path).unwrap();

        let reloaded = FleetFile::load(&path).unwrap();
        assert_eq!(reloaded.resources, fleet.resources);
    }

    #[test]
    fn test_collaborators_share_the_fleet() {
        let fleet: FleetFile = serde_json::from_str(FLEET).unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let loaded = fleet.into_collaborators(Arc::new(NoHolidays), clock);
        assert_eq!(loaded.fleet.resources().len(), 1);
        assert!(loaded.alerts.calls().is_empty());
    }

    #[test]
    fn test_holiday_file_from_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[holiday]]\ncountry = \"NZ\"\ndate = \"2025-12-25\"\nname = \"Christmas Day\"").unwrap();

        let mut config = Config::from_lookup(&|_: &str| None).unwrap();
        config.schedule.holiday_file = Some(file.path().to_path_buf());
        let calendar = holiday_calendar(&config).unwrap();
        let christmas = chrono::NaiveDate::from_ymd_opt(2025, 12, 25).unwrap();
        assert_eq!(calendar.holiday_name("NZ", christmas).as_deref(), Some("Christmas Day"));
    }

    #[test]
    fn test_default_config_uses_builtin_holidays() {
        let config = Config::from_lookup(&|_: &str| None).unwrap();
        let calendar = holiday_calendar(&config).unwrap();
        let waitangi = chrono::NaiveDate::from_ymd_opt(2025, 2, 6).unwrap();
        assert_eq!(calendar.holiday_name("NZ", waitangi).as_deref(), Some("Waitangi Day"));
    }

    #[test]
    fn test_unknown_country_without_file_fails() {
        let mut config = Config::from_lookup(&|_: &str| None).unwrap();
        config.schedule.holiday_country = "FR".into();
        assert!(holiday_calendar(&config).is_err());
    }
}
