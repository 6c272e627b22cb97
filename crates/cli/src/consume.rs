//! Long-running consumers over SQS, with an optional timer trigger.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use powermgmt_core::config::TriggerConfig;
use powermgmt_core::{Config, SystemClock};
use powermgmt_engine::{run_consumer, ConsumerOptions, Engine, MessageKind, Outbox, SubscriptionTrigger};
use powermgmt_queue::{QueueConsumer, SqsQueue};

use crate::cli::ConsumeArgs;
use crate::fleet::{holiday_calendar, FleetFile};
use crate::tick_file::FileTickStore;

pub async fn consume(config: Config, args: &ConsumeArgs) -> Result<()> {
    let sqs = |name: &str| -> Result<Arc<SqsQueue>> {
        let queue = SqsQueue::new(&config.aws, name, args.visibility_timeout)
            .with_context(|| format!("failed to open queue {name}"))?;
        Ok(Arc::new(queue))
    };
    let subscription_checks = sqs(&config.queues.subscription_checks)?;
    let power_actions = sqs(&config.queues.power_actions)?;
    let deferred_checks = sqs(&config.queues.deferred_checks)?;
    let maintenance_events = sqs(&config.queues.maintenance_events)?;

    let loaded = FleetFile::load(&args.fleet)?.into_collaborators(holiday_calendar(&config)?, Arc::new(SystemClock));
    let outbox = Outbox::new(
        subscription_checks.clone(),
        power_actions.clone(),
        deferred_checks.clone(),
    );
    let Engine { trigger, dispatcher, .. } = Engine::new(&config, loaded.collaborators, outbox);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumers: [(MessageKind, Arc<dyn QueueConsumer>); 4] = [
        (MessageKind::SubscriptionCheck, subscription_checks),
        (MessageKind::PowerAction, power_actions),
        (MessageKind::DeferredCheck, deferred_checks),
        (MessageKind::MaintenanceEvent, maintenance_events),
    ];

    let mut tasks = Vec::new();
    for (kind, queue) in consumers {
        tasks.push(tokio::spawn(run_consumer(
            kind,
            queue,
            dispatcher.clone(),
            ConsumerOptions::default(),
            shutdown_rx.clone(),
        )));
    }
    if args.trigger {
        let trigger = match &config.trigger.state_file {
            Some(path) => trigger.with_tick_store(Arc::new(FileTickStore::new(path.clone()))),
            None => {
                warn!("TRIGGER_STATE_FILE not set, ticks missed while stopped will not be caught up");
                trigger
            }
        };
        tasks.push(tokio::spawn(trigger_loop(trigger, config.trigger.clone(), shutdown_rx)));
    }
    info!(tasks = tasks.len(), "Consumers running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        task.await.context("consumer task panicked")?;
    }
    Ok(())
}

async fn trigger_loop(trigger: SubscriptionTrigger, cfg: TriggerConfig, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(u64::from(cfg.interval_minutes.max(1)) * 60);
    let mut ticker = tokio::time::interval(period);
    info!(interval_minutes = cfg.interval_minutes, "Timer trigger started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match trigger.on_timer(&cfg, Utc::now()).await {
                    Ok(count) => info!(subscriptions = count, "Timer tick enqueued checks"),
                    Err(e) => error!(error = %e, "Timer tick failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Timer trigger stopped");
}
