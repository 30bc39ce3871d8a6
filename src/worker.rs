use crate::error::Error;
use crate::message::ResultMessage;
use crate::signal::Shutdown;
use async_trait::async_trait;
use futures::channel::{mpsc, oneshot};
use futures::future;
use futures::{select, FutureExt, SinkExt, StreamExt};
use log::{debug, error, trace};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const INBOX_CAPACITY: usize = 10;

/// Behavior plugged into a [`Worker`].
///
/// A handler is only ever driven by its own worker loop, so it may keep mutable
/// state without synchronization.
#[async_trait]
pub trait Handler: Send + 'static {
    fn name(&self) -> &str;

    async fn handle(&mut self, message: &ResultMessage) -> Result<(), Error>;

    /// Runs once after the worker loop has ended.
    async fn finalize(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

pub(crate) struct Delivery {
    message: Arc<ResultMessage>,
    done: oneshot::Sender<()>,
}

/// Sending side of a worker's inbox.
#[derive(Clone)]
pub(crate) struct Inbox {
    worker: Arc<str>,
    sender: mpsc::Sender<Delivery>,
}

impl Inbox {
    /// Blocks while the inbox is full. Resolves to the completion signal of the
    /// delivered message.
    async fn deliver(
        &mut self,
        message: Arc<ResultMessage>,
    ) -> Result<oneshot::Receiver<()>, Error> {
        let (done, completion) = oneshot::channel();
        self.sender
            .send(Delivery { message, done })
            .await
            .map_err(|_| Error::WorkerStopped {
                worker: self.worker.to_string(),
            })?;
        Ok(completion)
    }
}

/// A named consumer running its handler in a single loop for its whole lifetime.
pub struct Worker<H> {
    name: Arc<str>,
    inbox: mpsc::Sender<Delivery>,
    task: JoinHandle<H>,
}

impl<H: Handler> Worker<H> {
    /// Spawns the consumption loop. The loop ends once `quit` fires and every
    /// message accepted before that has been handled.
    pub fn start(handler: H, quit: Shutdown) -> Self {
        let name: Arc<str> = Arc::from(handler.name());
        let (inbox, source) = mpsc::channel(INBOX_CAPACITY);
        let task = tokio::spawn(run(handler, source, quit));
        Self { name, inbox, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn inbox(&self) -> Inbox {
        Inbox {
            worker: self.name.clone(),
            sender: self.inbox.clone(),
        }
    }

    /// Waits for the loop to end and hands back the handler.
    pub async fn join(self) -> Result<H, Error> {
        drop(self.inbox);
        self.task.await.map_err(|_| Error::WorkerPanicked {
            worker: self.name.to_string(),
        })
    }
}

async fn run<H: Handler>(
    mut handler: H,
    mut source: mpsc::Receiver<Delivery>,
    mut quit: Shutdown,
) -> H {
    debug!("Worker {} started", handler.name());

    loop {
        let delivery = select! {
            delivery = source.next() => delivery,
            () = quit.wait().fuse() => break,
        };

        match delivery {
            Some(delivery) => process(&mut handler, delivery).await,
            None => {
                debug!("Worker {} inbox disconnected", handler.name());
                return handler;
            }
        }
    }

    source.close();
    while let Some(delivery) = source.next().await {
        process(&mut handler, delivery).await;
    }

    debug!("Worker {} stopped", handler.name());
    handler
}

async fn process<H: Handler>(handler: &mut H, delivery: Delivery) {
    let Delivery { message, done } = delivery;

    trace!(
        "Worker {} handling fitness {} from island {}",
        handler.name(),
        message.fitness,
        message.island
    );

    let outcome = AssertUnwindSafe(handler.handle(&message))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(
            "Worker {} failed on message from island {}: {}",
            handler.name(),
            message.island,
            err
        ),
        Err(panic) => error!(
            "Worker {} panicked on message from island {}: {}",
            handler.name(),
            message.island,
            panic_message(&*panic)
        ),
    }

    done.send(()).ok();
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown cause"
    }
}

/// Sends `message` to every inbox and waits until each worker has returned from
/// its handler. Resolves to the number of completions observed.
///
/// Fails without waiting if some worker no longer accepts messages.
pub(crate) async fn dispatch(
    message: Arc<ResultMessage>,
    inboxes: &mut [Inbox],
) -> Result<usize, Error> {
    let mut completions = Vec::with_capacity(inboxes.len());
    for inbox in inboxes.iter_mut() {
        completions.push(inbox.deliver(message.clone()).await?);
    }

    Ok(future::join_all(completions)
        .await
        .into_iter()
        .filter(Result::is_ok)
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal;
    use std::sync::Mutex;

    struct Recorder {
        seen: Arc<Mutex<Vec<i64>>>,
        fail: bool,
    }

    #[async_trait]
    impl Handler for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn handle(&mut self, message: &ResultMessage) -> Result<(), Error> {
            self.seen.lock().unwrap().push(message.fitness);
            if self.fail {
                Err(Error::MissingCycle { cycle: 0 })
            } else {
                Ok(())
            }
        }
    }

    /// Panics on negative fitness.
    struct Fragile {
        seen: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl Handler for Fragile {
        fn name(&self) -> &str {
            "fragile"
        }

        async fn handle(&mut self, message: &ResultMessage) -> Result<(), Error> {
            if message.fitness < 0 {
                panic!("negative fitness {}", message.fitness);
            }
            self.seen.lock().unwrap().push(message.fitness);
            Ok(())
        }
    }

    fn message(fitness: i64) -> Arc<ResultMessage> {
        Arc::new(
            ResultMessage::from_json(&format!(r#"{{"fitness":{fitness},"hostname":"1"}}"#))
                .unwrap(),
        )
    }

    fn recorder(fail: bool) -> (Recorder, Arc<Mutex<Vec<i64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Recorder {
                seen: seen.clone(),
                fail,
            },
            seen,
        )
    }

    #[tokio::test]
    async fn messages_handled_in_dispatch_order() {
        let (trigger, quit) = signal::channel();
        let (handler, seen) = recorder(false);
        let worker = Worker::start(handler, quit);
        let mut inboxes = vec![worker.inbox()];

        for fitness in 0..25 {
            assert_eq!(dispatch(message(fitness), &mut inboxes).await.unwrap(), 1);
        }

        trigger.fire().await;
        drop(inboxes);
        worker.join().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failing_handler_still_completes() {
        let (trigger, quit) = signal::channel();
        let (failing, failing_seen) = recorder(true);
        let (healthy, healthy_seen) = recorder(false);
        let first = Worker::start(failing, quit.clone());
        let second = Worker::start(healthy, quit);
        let mut inboxes = vec![first.inbox(), second.inbox()];

        assert_eq!(dispatch(message(3), &mut inboxes).await.unwrap(), 2);
        assert_eq!(dispatch(message(4), &mut inboxes).await.unwrap(), 2);

        trigger.fire().await;
        first.join().await.unwrap();
        second.join().await.unwrap();

        assert_eq!(*failing_seen.lock().unwrap(), vec![3, 4]);
        assert_eq!(*healthy_seen.lock().unwrap(), vec![3, 4]);
    }

    #[tokio::test]
    async fn panicking_handler_keeps_worker_alive() {
        let (trigger, quit) = signal::channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = Worker::start(Fragile { seen: seen.clone() }, quit);
        let mut inboxes = vec![worker.inbox()];

        assert_eq!(dispatch(message(1), &mut inboxes).await.unwrap(), 1);
        assert_eq!(dispatch(message(-1), &mut inboxes).await.unwrap(), 1);
        assert_eq!(dispatch(message(2), &mut inboxes).await.unwrap(), 1);

        trigger.fire().await;
        drop(inboxes);
        assert!(worker.join().await.is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn panic_payload_described() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&"boom".to_string()), "boom");
        assert_eq!(panic_message(&7_u8), "unknown cause");
    }

    #[tokio::test]
    async fn stopped_worker_rejects_delivery() {
        let (trigger, quit) = signal::channel();
        let (handler, seen) = recorder(false);
        let worker = Worker::start(handler, quit);
        let mut inboxes = vec![worker.inbox()];

        trigger.fire().await;
        let handler = worker.join().await.unwrap();

        assert!(matches!(
            dispatch(message(1), &mut inboxes).await,
            Err(Error::WorkerStopped { .. })
        ));
        assert_eq!(handler.name(), "recorder");
        assert!(seen.lock().unwrap().is_empty());
    }
}
