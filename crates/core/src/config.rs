use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::{PowerMgmtError, Result};
use crate::resource::ResourceKind;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Key lookup used to build config; the process environment in production,
/// a map in tests.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn get_opt(src: Lookup, key: &str) -> Option<String> {
    src(key).map(|v| v.trim().to_string()).filter(|s| !s.is_empty())
}

fn get_or(src: Lookup, key: &str, default: &str) -> String {
    get_opt(src, key).unwrap_or_else(|| default.to_string())
}

fn get_u32(src: Lookup, key: &str, default: u32) -> Result<u32> {
    match get_opt(src, key) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| PowerMgmtError::Config(format!("{key} must be a non-negative integer, got '{v}'"))),
    }
}

fn get_bool(src: Lookup, key: &str) -> bool {
    get_opt(src, key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn get_list(src: Lookup, key: &str) -> Vec<String> {
    get_opt(src, key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn get_secs(src: Lookup, key: &str, default: u32) -> Result<Duration> {
    get_u32(src, key, default).map(|s| Duration::from_secs(u64::from(s)))
}

fn get_millis(src: Lookup, key: &str, default: u32) -> Result<Duration> {
    get_u32(src, key, default).map(|ms| Duration::from_millis(u64::from(ms)))
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    pub schedule: ScheduleConfig,
    pub trigger: TriggerConfig,
    pub queues: QueueNames,
    pub deferred: DeferredConfig,
    pub retry: RetryConfig,
    pub aws: AwsConfig,
    pub audit: AuditConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_opt)
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(src: Lookup) -> Result<Self> {
        Ok(Self {
            schedule: ScheduleConfig::from_lookup(src)?,
            trigger: TriggerConfig::from_lookup(src)?,
            queues: QueueNames::from_lookup(src),
            deferred: DeferredConfig::from_lookup(src)?,
            retry: RetryConfig::from_lookup(src)?,
            aws: AwsConfig::from_lookup(src),
            audit: AuditConfig::from_lookup(src),
        })
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        let types: Vec<&str> = self
            .schedule
            .types_enabled
            .iter()
            .map(ResourceKind::feature_name)
            .collect();
        tracing::info!("Config loaded:");
        tracing::info!(
            "  schedule:    tz={}, holidays={}, types={}",
            self.schedule.timezone,
            self.schedule.holiday_country,
            types.join(",")
        );
        tracing::info!(
            "  trigger:     interval={}m, scopes={}",
            self.trigger.interval_minutes,
            self.trigger.scopes().join(",")
        );
        tracing::info!(
            "  queues:      subs={}, actions={}, deferred={}, maintenance={}",
            self.queues.subscription_checks,
            self.queues.power_actions,
            self.queues.deferred_checks,
            self.queues.maintenance_events
        );
        tracing::info!(
            "  deferred:    delay={}s, max_retries={}",
            self.deferred.delay.as_secs(),
            self.deferred.max_retries
        );
        tracing::info!(
            "  aws:         region={}, credentials={}",
            self.aws.region,
            if self.aws.has_static_credentials() { "static" } else { "(default chain)" }
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "schedule": {
                "timezone": self.schedule.timezone.name(),
                "holiday_country": self.schedule.holiday_country,
                "holiday_file": self.schedule.holiday_file,
                "always_off_delay": self.schedule.always_off_delay,
                "types_enabled": self.schedule.types_enabled.iter().map(ResourceKind::feature_name).collect::<Vec<_>>(),
            },
            "trigger": {
                "interval_minutes": self.trigger.interval_minutes,
                "reset_last_invocation": self.trigger.reset_last_invocation,
                "scopes": self.trigger.scopes(),
                "state_file": self.trigger.state_file,
            },
            "queues": {
                "subscription_checks": self.queues.subscription_checks,
                "power_actions": self.queues.power_actions,
                "deferred_checks": self.queues.deferred_checks,
                "maintenance_events": self.queues.maintenance_events,
            },
            "deferred": {
                "delay_secs": self.deferred.delay.as_secs(),
                "max_retries": self.deferred.max_retries,
                "poll_timeout_ms": self.deferred.poll_timeout.as_millis() as u64,
            },
            "retry": {
                "max_elapsed_secs": self.retry.max_elapsed.as_secs(),
                "initial_delay_ms": self.retry.initial_delay.as_millis() as u64,
                "max_delay_ms": self.retry.max_delay.as_millis() as u64,
            },
            "aws": {
                "region": self.aws.region,
                "queue_url_prefix": self.aws.queue_url_prefix,
                "endpoint_url": self.aws.endpoint_url,
                "static_credentials": self.aws.has_static_credentials(),
            },
            "audit": { "timestamp_suffix": self.audit.timestamp_suffix },
        })
    }
}

// ── Schedule evaluation ───────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Business time zone; cron expressions and grids are local to it.
    pub timezone: Tz,
    pub holiday_country: String,
    /// Optional TOML holiday list.
    pub holiday_file: Option<PathBuf>,
    /// Hour step of the `alwaysoff` preset.
    pub always_off_delay: u32,
    pub types_enabled: Vec<ResourceKind>,
}

impl ScheduleConfig {
    fn from_lookup(src: Lookup) -> Result<Self> {
        let tz_name = get_or(src, "POWERMGMT_TIMEZONE", "Pacific/Auckland");
        let timezone: Tz = tz_name
            .parse()
            .map_err(|_| PowerMgmtError::Config(format!("unknown time zone '{tz_name}'")))?;

        let mut types_enabled = Vec::new();
        for name in get_list(src, "TYPES_ENABLED") {
            let kind = ResourceKind::from_feature_name(&name).ok_or_else(|| {
                PowerMgmtError::Config(format!("unknown resource type '{name}' in TYPES_ENABLED"))
            })?;
            if !types_enabled.contains(&kind) {
                types_enabled.push(kind);
            }
        }
        if types_enabled.is_empty() {
            types_enabled = ResourceKind::ALL.to_vec();
        }

        let always_off_delay = get_u32(src, "ALWAYSOFF_DELAY", 4)?;
        if !(1..=23).contains(&always_off_delay) {
            return Err(PowerMgmtError::Config(format!(
                "ALWAYSOFF_DELAY must be between 1 and 23, got {always_off_delay}"
            )));
        }

        Ok(Self {
            timezone,
            holiday_country: get_or(src, "HOLIDAY_COUNTRY", "NZ").to_uppercase(),
            holiday_file: get_opt(src, "HOLIDAY_FILE").map(PathBuf::from),
            always_off_delay,
            types_enabled,
        })
    }
}

// ── Timer trigger ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub interval_minutes: u32,
    /// Ignore the stored last tick and evaluate from one interval ago.
    pub reset_last_invocation: bool,
    pub subscription_scopes: Vec<String>,
    pub management_group_scopes: Vec<String>,
    /// Where `consume --trigger` records its last tick across restarts.
    pub state_file: Option<PathBuf>,
}

impl TriggerConfig {
    fn from_lookup(src: Lookup) -> Result<Self> {
        Ok(Self {
            interval_minutes: get_u32(src, "TRIGGER_INTERVAL", 5)?,
            reset_last_invocation: get_bool(src, "RESET_LAST_INVOCATION"),
            subscription_scopes: get_list(src, "SUB_SCOPES"),
            management_group_scopes: get_list(src, "MG_SCOPES"),
            state_file: get_opt(src, "TRIGGER_STATE_FILE").map(PathBuf::from),
        })
    }

    /// Scopes to fan out over; subscription scopes win when both are set.
    pub fn scopes(&self) -> &[String] {
        if self.subscription_scopes.is_empty() {
            &self.management_group_scopes
        } else {
            &self.subscription_scopes
        }
    }
}

// ── Queues ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct QueueNames {
    pub subscription_checks: String,
    pub power_actions: String,
    pub deferred_checks: String,
    pub maintenance_events: String,
}

impl QueueNames {
    fn from_lookup(src: Lookup) -> Self {
        Self {
            subscription_checks: get_or(src, "QUEUE_PROCESS_SUBS", "process-subs"),
            power_actions: get_or(src, "QUEUE_POWERMGMT_EVENTS", "powermgmt-events"),
            deferred_checks: get_or(src, "QUEUE_POWERMGMT_DEFERRED_CHECKS", "powermgmt-deferred-checks"),
            maintenance_events: get_or(src, "QUEUE_PROCESS_UPDATEMGMT_EVENT", "process-updatemgmt-event"),
        }
    }
}

// ── Deferred checks ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DeferredConfig {
    /// Delivery delay before an in-flight operation is polled again.
    pub delay: Duration,
    /// In-progress polls tolerated before giving up.
    pub max_retries: u32,
    pub poll_timeout: Duration,
}

impl DeferredConfig {
    fn from_lookup(src: Lookup) -> Result<Self> {
        let delay = get_secs(src, "DEFERRED_CHECK_DELAY_SECS", 60)?;
        // Queues cannot hold a message back for longer than 15 minutes.
        if delay > Duration::from_secs(900) {
            return Err(PowerMgmtError::Config(format!(
                "DEFERRED_CHECK_DELAY_SECS must be at most 900, got {}",
                delay.as_secs()
            )));
        }
        Ok(Self {
            delay,
            max_retries: get_u32(src, "DEFERRED_CHECK_MAX_RETRIES", 10)?,
            poll_timeout: get_millis(src, "DEFERRED_CHECK_POLL_TIMEOUT_MS", 1000)?,
        })
    }
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(60),
            max_retries: 10,
            poll_timeout: Duration::from_secs(1),
        }
    }
}

// ── Provider call retries ─────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_elapsed: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    fn from_lookup(src: Lookup) -> Result<Self> {
        let cfg = Self {
            max_elapsed: get_secs(src, "RETRY_MAX_ELAPSED_SECS", 30)?,
            initial_delay: get_millis(src, "RETRY_INITIAL_DELAY_MS", 2000)?,
            max_delay: get_millis(src, "RETRY_MAX_DELAY_MS", 6000)?,
        };
        if cfg.initial_delay > cfg.max_delay {
            return Err(PowerMgmtError::Config(
                "RETRY_INITIAL_DELAY_MS must not exceed RETRY_MAX_DELAY_MS".into(),
            ));
        }
        Ok(cfg)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_elapsed: Duration::from_secs(30),
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(6),
        }
    }
}

// ── AWS / SQS ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// Queue URLs are `{prefix}/{queue name}`.
    pub queue_url_prefix: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_lookup(src: Lookup) -> Self {
        Self {
            region: get_or(src, "AWS_REGION", "ap-southeast-2"),
            access_key_id: get_opt(src, "AWS_ACCESS_KEY_ID"),
            secret_access_key: get_opt(src, "AWS_SECRET_ACCESS_KEY"),
            session_token: get_opt(src, "AWS_SESSION_TOKEN"),
            queue_url_prefix: get_opt(src, "SQS_QUEUE_URL_PREFIX"),
            // Deliberately not AWS_ENDPOINT_URL, which may point at another service.
            endpoint_url: get_opt(src, "QUEUE_AWS_ENDPOINT_URL"),
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    pub fn queue_url(&self, queue_name: &str) -> Result<String> {
        let prefix = self
            .queue_url_prefix
            .as_deref()
            .ok_or_else(|| PowerMgmtError::Config("SQS_QUEUE_URL_PREFIX is not set".into()))?;
        Ok(format!("{}/{}", prefix.trim_end_matches('/'), queue_name))
    }
}

// ── Audit ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub timestamp_suffix: String,
}

impl AuditConfig {
    fn from_lookup(src: Lookup) -> Self {
        Self {
            timestamp_suffix: get_or(src, "AUDIT_TIMESTAMP_SUFFIX", "NZT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(&move |key: &str| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.schedule.timezone, chrono_tz::Pacific::Auckland);
        assert_eq!(cfg.schedule.holiday_country, "NZ");
        assert_eq!(cfg.schedule.always_off_delay, 4);
        assert_eq!(cfg.schedule.types_enabled.len(), 4);
        assert_eq!(cfg.trigger.interval_minutes, 5);
        assert!(!cfg.trigger.reset_last_invocation);
        assert_eq!(cfg.deferred.delay, Duration::from_secs(60));
        assert_eq!(cfg.deferred.max_retries, 10);
        assert_eq!(cfg.deferred.poll_timeout, Duration::from_secs(1));
        assert_eq!(cfg.retry.max_elapsed, Duration::from_secs(30));
        assert_eq!(cfg.audit.timestamp_suffix, "NZT");
    }

    #[test]
    fn types_enabled_filters_kinds() {
        let cfg = config_from(&[("TYPES_ENABLED", "vm, psql,vm")]).unwrap();
        assert_eq!(
            cfg.schedule.types_enabled,
            vec![ResourceKind::VirtualMachine, ResourceKind::PostgresFlexibleServer]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("POWERMGMT_TIMEZONE", "Mars/Olympus")]).is_err());
        assert!(config_from(&[("TYPES_ENABLED", "vm,toaster")]).is_err());
        assert!(config_from(&[("ALWAYSOFF_DELAY", "0")]).is_err());
        assert!(config_from(&[("TRIGGER_INTERVAL", "five")]).is_err());
        assert!(config_from(&[("DEFERRED_CHECK_DELAY_SECS", "901")]).is_err());
        assert!(config_from(&[("DEFERRED_CHECK_DELAY_SECS", "900")]).is_ok());
        assert!(config_from(&[
            ("RETRY_INITIAL_DELAY_MS", "9000"),
            ("RETRY_MAX_DELAY_MS", "1000"),
        ])
        .is_err());
    }

    #[test]
    fn subscription_scopes_win_over_management_groups() {
        let cfg = config_from(&[("SUB_SCOPES", "s1,s2"), ("MG_SCOPES", "mg1")]).unwrap();
        assert_eq!(cfg.trigger.scopes(), ["s1".to_string(), "s2".to_string()]);

        let cfg = config_from(&[("MG_SCOPES", "mg1")]).unwrap();
        assert_eq!(cfg.trigger.scopes(), ["mg1".to_string()]);
    }

    #[test]
    fn queue_urls_require_prefix() {
        let cfg = config_from(&[]).unwrap();
        assert!(cfg.aws.queue_url("q").is_err());

        let cfg = config_from(&[("SQS_QUEUE_URL_PREFIX", "https://sqs.local/123/")]).unwrap();
        assert_eq!(cfg.aws.queue_url("q").unwrap(), "https://sqs.local/123/q");
    }

    #[test]
    fn redacted_summary_hides_secrets() {
        let cfg = config_from(&[
            ("AWS_ACCESS_KEY_ID", "AKIA123"),
            ("AWS_SECRET_ACCESS_KEY", "shh"),
        ])
        .unwrap();
        let summary = cfg.redacted_summary().to_string();
        assert!(!summary.contains("shh"));
        assert!(!summary.contains("AKIA123"));
        assert!(summary.contains("\"static_credentials\":true"));
    }
}
