//! Dry run of one timer tick: scan, actions and deferred polls against an
//! in-memory fleet, on a clock that jumps ahead by the deferred-check delay.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use tracing::info;

use powermgmt_core::tags::{TAG_LAST_UPDATED, TAG_STATUS};
use powermgmt_core::{Clock, Config, FixedClock};
use powermgmt_engine::{Engine, MessageKind, Outbox};
use powermgmt_queue::InMemoryQueue;

use crate::cli::SimulateArgs;
use crate::commands::time_or_now;
use crate::fleet::{holiday_calendar, FleetFile};

const BATCH_SIZE: u32 = 10;

pub async fn simulate(mut config: Config, args: &SimulateArgs) -> Result<()> {
    let tz = config.schedule.timezone;
    let now = time_or_now(args.at.as_deref(), tz)?;
    let clock = Arc::new(FixedClock::new(now));

    let file = FleetFile::load(&args.fleet)?;
    if config.trigger.scopes().is_empty() {
        config.trigger.subscription_scopes = file.subscriptions.iter().map(|s| s.id.clone()).collect();
    }
    let loaded = file.clone().into_collaborators(holiday_calendar(&config)?, clock.clone());
    loaded.fleet.set_polls_to_complete(args.polls);

    let subscription_checks = Arc::new(InMemoryQueue::new(&config.queues.subscription_checks, clock.clone()));
    let power_actions = Arc::new(InMemoryQueue::new(&config.queues.power_actions, clock.clone()));
    let deferred_checks = Arc::new(InMemoryQueue::new(&config.queues.deferred_checks, clock.clone()));
    let outbox = Outbox::new(
        subscription_checks.clone(),
        power_actions.clone(),
        deferred_checks.clone(),
    );
    let engine = Engine::new(&config, loaded.collaborators, outbox);
    let dispatcher = &engine.dispatcher;

    let subscriptions = engine.trigger.on_timer(&config.trigger, now).await?;
    let scanned = dispatcher
        .drain(MessageKind::SubscriptionCheck, subscription_checks.as_ref(), BATCH_SIZE)
        .await?;
    let actions = dispatcher
        .drain(MessageKind::PowerAction, power_actions.as_ref(), BATCH_SIZE)
        .await?;

    let step = TimeDelta::from_std(config.deferred.delay).context("deferred check delay out of range")?;
    let mut polls = 0;
    // One round per permitted retry, plus the timeout round.
    for _ in 0..=config.deferred.max_retries + 1 {
        if deferred_checks.is_empty().await {
            break;
        }
        clock.advance(step);
        polls += dispatcher
            .drain(MessageKind::DeferredCheck, deferred_checks.as_ref(), BATCH_SIZE)
            .await?;
    }
    info!(subscriptions, scanned, actions, polls, "Simulation finished");

    println!(
        "tick {} ({}): {subscriptions} subscriptions, {actions} actions, {polls} deferred polls",
        now.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z"),
        now.format("%H:%M UTC"),
    );
    println!("finished at {}", clock.now().with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z"));
    println!();
    println!("{:<24} {:<12} {:<40} LAST UPDATED", "RESOURCE", "POWER", "STATUS");
    let resources = loaded.fleet.resources();
    for r in &resources {
        println!(
            "{:<24} {:<12} {:<40} {}",
            r.name(),
            r.power_state,
            r.tag(TAG_STATUS).unwrap_or("-"),
            r.tag(TAG_LAST_UPDATED).unwrap_or("-"),
        );
    }

    let suppressions = loaded.alerts.calls();
    if !suppressions.is_empty() {
        println!();
        for call in &suppressions {
            println!(
                "{} {} for {} alerts ({})",
                if call.suppressed { "suppressed" } else { "re-enabled" },
                call.rule_name,
                call.alert_ids.len(),
                call.alert_ids.join(", ")
            );
        }
    }

    if let Some(path) = &args.write {
        FleetFile { resources, ..file }.save(path)?;
        println!("\nwrote {}", path.display());
    }
    Ok(())
}
