use crate::error::Error;
use crate::message::ResultMessage;
use crate::migrator::Migrator;
use crate::monitor::{Monitor, MONITOR_NAME};
use crate::queue::{ReceivedMessage, ResultQueue};
use crate::signal::{self, Shutdown};
use crate::worker::{dispatch, Handler, Inbox, Worker};
use async_trait::async_trait;
use futures::future;
use log::{debug, error, info, trace, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Lower bound on the pause after a failed receive.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    pub max_messages: i32,
    pub wait_time: Duration,
    pub worker_pool: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(1),
            worker_pool: 1,
        }
    }
}

/// The workers the orchestrator runs.
pub enum IslandWorker {
    Migrator(Migrator),
    Monitor(Monitor),
}

#[async_trait]
impl Handler for IslandWorker {
    fn name(&self) -> &str {
        match self {
            IslandWorker::Migrator(migrator) => migrator.name(),
            IslandWorker::Monitor(monitor) => monitor.name(),
        }
    }

    async fn handle(&mut self, message: &ResultMessage) -> Result<(), Error> {
        match self {
            IslandWorker::Migrator(migrator) => migrator.handle(message).await,
            IslandWorker::Monitor(monitor) => monitor.handle(message).await,
        }
    }

    async fn finalize(&mut self) -> Result<(), Error> {
        match self {
            IslandWorker::Migrator(migrator) => migrator.finalize().await,
            IslandWorker::Monitor(monitor) => monitor.finalize().await,
        }
    }
}

/// Turns queue traffic into worker invocations.
///
/// A message is deleted from the queue only after every worker has returned
/// from its handler for it.
pub struct Collector {
    queue: Arc<dyn ResultQueue>,
    settings: CollectorSettings,
}

impl Collector {
    pub fn new(queue: Arc<dyn ResultQueue>, settings: CollectorSettings) -> Result<Self, Error> {
        if settings.worker_pool == 0 {
            return Err(Error::InvalidConfig {
                option: "worker_pool",
                reason: "at least one poller is required".to_string(),
            });
        }
        if !(1..=10).contains(&settings.max_messages) {
            return Err(Error::InvalidConfig {
                option: "max_messages",
                reason: format!("{} is outside 1..=10", settings.max_messages),
            });
        }

        Ok(Self { queue, settings })
    }

    /// Runs the pollers and `handlers` until `shutdown` resolves, then drains
    /// in-flight work, finalizes the monitor and hands the handlers back.
    ///
    /// A worker whose task died is logged and left out of the returned handlers.
    pub async fn collect<H, S>(&self, handlers: Vec<H>, shutdown: S) -> Result<Vec<H>, Error>
    where
        H: Handler,
        S: Future<Output = ()>,
    {
        let (trigger, quit) = signal::channel();

        let workers: Vec<Worker<H>> = handlers
            .into_iter()
            .map(|handler| Worker::start(handler, quit.clone()))
            .collect();
        let inboxes: Vec<Inbox> = workers.iter().map(Worker::inbox).collect();

        info!(
            "Starting {} pollers feeding workers: {}",
            self.settings.worker_pool,
            workers
                .iter()
                .map(Worker::name)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let pollers: Vec<_> = (1..=self.settings.worker_pool)
            .map(|id| {
                tokio::spawn(poll(
                    id,
                    self.queue.clone(),
                    self.settings,
                    inboxes.clone(),
                    quit.clone(),
                ))
            })
            .collect();
        drop(inboxes);

        shutdown.await;
        info!("Shutdown requested, draining in-flight messages");
        trigger.fire().await;

        for (id, result) in (1..).zip(future::join_all(pollers).await) {
            if result.is_err() {
                error!("Poller {} terminated abnormally", id);
            }
        }

        let mut handlers = Vec::with_capacity(workers.len());
        for result in future::join_all(workers.into_iter().map(Worker::join)).await {
            match result {
                Ok(handler) => handlers.push(handler),
                Err(err) => error!("{}", err),
            }
        }

        if let Some(monitor) = handlers
            .iter_mut()
            .find(|handler| handler.name() == MONITOR_NAME)
        {
            if let Err(err) = monitor.finalize().await {
                error!("Final aggregation failed: {}", err);
            }
        }

        info!("Collector stopped");
        Ok(handlers)
    }
}

async fn poll(
    id: usize,
    queue: Arc<dyn ResultQueue>,
    settings: CollectorSettings,
    mut inboxes: Vec<Inbox>,
    mut quit: Shutdown,
) {
    debug!("Poller {} started", id);

    while !quit.is_fired() {
        let batch = match queue
            .receive(settings.max_messages, settings.wait_time)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                warn!("Poller {}: receive failed, retrying: {}", id, err);
                let delay = settings.wait_time.max(RECEIVE_RETRY_DELAY);
                tokio::time::timeout(delay, quit.wait()).await.ok();
                continue;
            }
        };

        for received in batch {
            if quit.is_fired() {
                debug!("Poller {}: leaving rest of batch for redelivery", id);
                break;
            }
            process(queue.as_ref(), received, &mut inboxes).await;
        }
    }

    debug!("Poller {} stopped", id);
}

async fn process(queue: &dyn ResultQueue, received: ReceivedMessage, inboxes: &mut [Inbox]) {
    let Some(delivery_handle) = received.delivery_handle.clone() else {
        warn!("Skipping message without delivery handle");
        return;
    };

    match ResultMessage::from_received(received) {
        Ok(message) => {
            let expected = inboxes.len();
            match dispatch(Arc::new(message), inboxes).await {
                Ok(completed) if completed == expected => {}
                Ok(completed) => {
                    error!(
                        "Only {} of {} workers completed, leaving message for redelivery",
                        completed, expected
                    );
                    return;
                }
                Err(err) => {
                    warn!("{}, leaving message for redelivery", err);
                    return;
                }
            }
        }
        Err(err) => warn!("Dropping malformed message: {}", err),
    }

    match queue.delete(&delivery_handle).await {
        Ok(()) => trace!("Deleted message {}", delivery_handle),
        Err(err) => warn!("Unable to delete message {}: {}", delivery_handle, err),
    }
}
