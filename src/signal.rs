use async_broadcast::{broadcast, Receiver, Sender, TryRecvError};

/// Creates a shutdown signal. The [`Trigger`] fires it once; every clone of the
/// [`Shutdown`] observes it.
pub fn channel() -> (Trigger, Shutdown) {
    let (sender, receiver) = broadcast(1);
    (
        Trigger(sender),
        Shutdown {
            receiver,
            fired: false,
        },
    )
}

pub struct Trigger(Sender<()>);

impl Trigger {
    pub async fn fire(self) {
        self.0.broadcast(()).await.ok();
    }
}

#[derive(Clone)]
pub struct Shutdown {
    receiver: Receiver<()>,
    fired: bool,
}

impl Shutdown {
    /// Non-blocking check. A dropped trigger counts as fired.
    pub fn is_fired(&mut self) -> bool {
        if !self.fired {
            match self.receiver.try_recv() {
                Ok(()) | Err(TryRecvError::Closed) => self.fired = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Overflowed(_)) => {}
            }
        }
        self.fired
    }

    pub async fn wait(&mut self) {
        if !self.fired {
            self.receiver.recv().await.ok();
            self.fired = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_clone_observes_signal() {
        let (trigger, mut first) = channel();
        let mut second = first.clone();

        assert!(!first.is_fired());
        assert!(!second.is_fired());

        trigger.fire().await;

        assert!(first.is_fired());
        assert!(first.is_fired());
        second.wait().await;
        assert!(second.is_fired());
    }

    #[tokio::test]
    async fn dropped_trigger_counts_as_fired() {
        let (trigger, mut shutdown) = channel();
        drop(trigger);
        assert!(shutdown.is_fired());
    }
}
