use anyhow::{Context, Result};
use archipelago::collector::{Collector, IslandWorker};
use archipelago::config::Config;
use archipelago::metrics::{self, PrometheusSink};
use archipelago::migrator::Migrator;
use archipelago::monitor::Monitor;
use archipelago::notifier::{HttpNotifier, Notifier};
use archipelago::queue::SqsQueue;
use clap::Parser;
use futures::channel::mpsc;
use futures::executor;
use futures::{SinkExt, StreamExt};
use log::{error, info};
use prometheus::Registry;
use std::sync::Arc;
use tokio::runtime::Builder;

fn init_logger(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.verbose.log_level_filter())
        .format_module_path(false)
        .format_target(false)
        .init();
}

async fn run(config: Config) -> Result<()> {
    let (stop_sender, mut stop_recv) = mpsc::unbounded::<()>();

    let mut sender_for_handler = stop_sender.clone();
    ctrlc::set_handler(move || {
        info!("Received signal, will stop after in-flight messages are processed");
        executor::block_on(sender_for_handler.send(())).ok();
    })
    .context("Unable to set signal handler")?;

    let registry = Registry::new();
    let sink = Arc::new(PrometheusSink::register(&registry).context("Unable to register metrics")?);
    let metrics_addr = config.metrics_addr;
    let listener = metrics::bind(metrics_addr)
        .await
        .with_context(|| format!("Unable to bind metrics endpoint to {}", metrics_addr))?;
    let metrics_server = tokio::spawn(async move {
        if let Err(err) = metrics::serve(listener, registry).await {
            error!("Metrics endpoint on {} failed: {}", metrics_addr, err);
        }
    });

    let notifier: Arc<dyn Notifier> = Arc::new(
        HttpNotifier::new(config.http_timeout()).context("Unable to build HTTP client")?,
    );

    info!("Connecting to queue: {}", config.queue_url);
    let queue = Arc::new(SqsQueue::from_env(config.queue_url.clone()).await);

    let migrator = Migrator::new(config.total_islands, config.endpoints(), notifier.clone())
        .context("Unable to create migrator")?;
    let monitor = Monitor::new(config.monitor_settings(), config.endpoints(), notifier, sink)
        .context("Unable to create monitor")?;
    let collector =
        Collector::new(queue, config.collector_settings()).context("Unable to create collector")?;
    info!("Migrating across a ring of {} islands", migrator.total_islands());

    let workers = vec![IslandWorker::Migrator(migrator), IslandWorker::Monitor(monitor)];
    let shutdown = async move {
        stop_recv.next().await;
    };

    collector
        .collect(workers, shutdown)
        .await
        .context("Collector failed")?;

    drop(stop_sender);
    metrics_server.abort();
    Ok(())
}

fn main() -> Result<()> {
    let config = Config::parse();

    init_logger(&config);
    config.validate().context("Invalid configuration")?;

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Unable to start runtime")?;

    runtime.block_on(run(config))?;

    info!("Done");

    Ok(())
}
