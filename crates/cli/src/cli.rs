use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Operator tooling for scheduled power management.
///
/// Evaluates schedules and alert rules offline, dry-runs the workflow against
/// a fleet file, and runs the queue consumers.
#[derive(Parser, Debug)]
#[command(name = "powermgmt", about = "Scheduled power management for cloud resources")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a schedule at a point in time
    Check(CheckArgs),

    /// Convert a weekday grid to the cron in effect on a date
    Grid(GridArgs),

    /// Match a resource against alert rules
    Alerts(AlertsArgs),

    /// Dry-run one timer tick against a fleet file
    Simulate(SimulateArgs),

    /// Run the queue consumers over SQS
    Consume(ConsumeArgs),

    /// Print the resolved configuration
    Config,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Preset name (businesshours, alwaysoff, ...)
    #[arg(long)]
    pub schedule: Option<String>,

    /// PowerOn tag value: cron expression or weekday grid
    #[arg(long)]
    pub power_on: Option<String>,

    /// PowerOff tag value: cron expression or weekday grid
    #[arg(long)]
    pub power_off: Option<String>,

    /// Evaluation time, RFC 3339 or local "YYYY-MM-DD HH:MM" (default: now)
    #[arg(long)]
    pub at: Option<String>,

    /// Previous tick; defaults to one trigger interval before --at
    #[arg(long)]
    pub last_check: Option<String>,
}

#[derive(Args, Debug)]
pub struct GridArgs {
    /// Seven comma-separated slots, Monday first, e.g. "8,8,8,8,8,-,-"
    pub grid: String,

    /// Local date, YYYY-MM-DD (default: today)
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Args, Debug)]
pub struct AlertsArgs {
    /// Full resource id
    pub resource_id: String,

    /// JSON file holding an array of alert rules
    #[arg(long)]
    pub rules: PathBuf,

    /// Resource type override (default: taken from the id)
    #[arg(long)]
    pub resource_type: Option<String>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Fleet file: subscriptions, resources, alerts and maintenance runs
    #[arg(long)]
    pub fleet: PathBuf,

    /// Tick time, RFC 3339 or local "YYYY-MM-DD HH:MM" (default: now)
    #[arg(long)]
    pub at: Option<String>,

    /// In-progress polls before each operation completes
    #[arg(long, default_value = "1")]
    pub polls: u32,

    /// Write the resulting fleet back to this file
    #[arg(long)]
    pub write: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ConsumeArgs {
    /// Fleet file backing the providers
    #[arg(long)]
    pub fleet: PathBuf,

    /// Also fire the subscription trigger every TRIGGER_INTERVAL minutes
    #[arg(long)]
    pub trigger: bool,

    /// SQS visibility timeout for received messages
    #[arg(long, default_value = "300")]
    pub visibility_timeout: u32,
}
