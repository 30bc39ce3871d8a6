use crate::error::Error;
use crate::island::IslandId;
use crate::message::ResultMessage;
use crate::metrics::{FitnessSink, TRAINING_PHASE};
use crate::notifier::{is_success, IslandEndpoints, Notifier};
use crate::store::{ResultRow, ResultStore};
use crate::worker::Handler;
use async_trait::async_trait;
use futures::future;
use log::{debug, info, trace, warn};
use std::collections::HashSet;
use std::sync::Arc;

pub const MONITOR_NAME: &str = "monitor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Number of previous results an island's newest fitness must beat.
    pub window: usize,
    /// Cycle-over-cycle regressions tolerated before the whole run is halted.
    pub global_patience: i64,
}

/// Tracks training progress and stops islands, or the whole run, once
/// fitness stagnates.
pub struct Monitor {
    settings: MonitorSettings,
    store: ResultStore,
    train_cycle: u64,
    patience: i64,
    stopped: HashSet<IslandId>,
    halted: bool,
    endpoints: IslandEndpoints,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn FitnessSink>,
}

impl Monitor {
    pub fn new(
        settings: MonitorSettings,
        endpoints: IslandEndpoints,
        notifier: Arc<dyn Notifier>,
        sink: Arc<dyn FitnessSink>,
    ) -> Result<Self, Error> {
        if settings.window == 0 {
            return Err(Error::InvalidConfig {
                option: "patience",
                reason: "window must hold at least one result".to_string(),
            });
        }
        if settings.global_patience < 0 {
            return Err(Error::InvalidConfig {
                option: "global_patience",
                reason: "must not be negative".to_string(),
            });
        }

        Ok(Self {
            settings,
            store: ResultStore::new(),
            train_cycle: 0,
            patience: settings.global_patience,
            stopped: HashSet::new(),
            halted: false,
            endpoints,
            notifier,
            sink,
        })
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn train_cycle(&self) -> u64 {
        self.train_cycle
    }

    pub fn patience(&self) -> i64 {
        self.patience
    }

    pub fn is_stopped(&self, island: &IslandId) -> bool {
        self.stopped.contains(island)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// `None` while the island has fewer than a full window of results.
    /// Improvement means strictly beating every result in the window.
    fn has_improved(&self, island: &IslandId, fitness: i64) -> Option<bool> {
        let window: Vec<i64> = self
            .store
            .recent(island, self.settings.window)
            .map(|row| row.fitness)
            .collect();

        if window.len() < self.settings.window {
            return None;
        }

        Some(window.iter().all(|&previous| fitness > previous))
    }

    fn record(&mut self, message: &ResultMessage) {
        self.sink
            .record(message.island.name(), TRAINING_PHASE, message.fitness as f64);

        self.train_cycle += 1;
        self.store.append(ResultRow {
            cycle: self.train_cycle,
            island: message.island.clone(),
            fitness: message.fitness,
            best_fitness_so_far: 0,
            hyperparameters: message.hyperparameters.clone(),
        });

        trace!(
            "Recorded fitness {} for island {} in cycle {}",
            message.fitness,
            message.island,
            self.train_cycle
        );
    }

    /// Compares the best fitness of the current cycle with the previous one and
    /// halts the whole run once the global patience runs out.
    pub async fn combine_results(&mut self) -> Result<(), Error> {
        if self.train_cycle < 2 {
            debug!(
                "Skipping aggregation, only {} training cycles recorded",
                self.train_cycle
            );
            return Ok(());
        }

        self.store.refresh_best_so_far();

        let cycle = self.train_cycle;
        let current_best = self
            .store
            .best_in_cycle(cycle)
            .ok_or(Error::MissingCycle { cycle })?;
        let previous_best = self
            .store
            .best_in_cycle(cycle - 1)
            .ok_or(Error::MissingCycle { cycle: cycle - 1 })?;

        if current_best >= previous_best {
            info!(
                "Best fitness {} in cycle {} holds against {} in the previous cycle",
                current_best, cycle, previous_best
            );
            return Ok(());
        }

        self.patience -= 1;
        info!(
            "Best fitness regressed from {} to {} in cycle {}, patience left: {}",
            previous_best, current_best, cycle, self.patience
        );

        if self.patience < 0 && !self.halted {
            self.halt().await;
        }

        Ok(())
    }

    /// Stops every island that has reported and is still training.
    async fn halt(&mut self) {
        self.halted = true;

        let islands: Vec<IslandId> = self
            .store
            .islands()
            .into_iter()
            .filter(|island| !self.stopped.contains(island))
            .collect();

        info!(
            "Global patience exhausted, stopping {} islands",
            islands.len()
        );

        let notifier = &self.notifier;
        let endpoints = &self.endpoints;
        future::join_all(
            islands
                .iter()
                .map(|island| stop_training(notifier.as_ref(), endpoints, island)),
        )
        .await;

        self.stopped.extend(islands);
    }
}

async fn stop_training(notifier: &dyn Notifier, endpoints: &IslandEndpoints, island: &IslandId) {
    let url = endpoints.stop_training(island);
    match notifier.get(&url).await {
        Ok(status) if is_success(status) => info!("Stopped training on island {}", island),
        Ok(status) => warn!(
            "Island {} answered stop request with status {}",
            island, status
        ),
        Err(err) => warn!("Unable to stop training on island {}: {}", island, err),
    }
}

#[async_trait]
impl Handler for Monitor {
    fn name(&self) -> &str {
        MONITOR_NAME
    }

    async fn handle(&mut self, message: &ResultMessage) -> Result<(), Error> {
        if self.stopped.contains(&message.island) {
            debug!(
                "Ignoring fitness {} from stopped island {}",
                message.fitness, message.island
            );
            return Ok(());
        }

        if self.has_improved(&message.island, message.fitness) == Some(false) {
            info!(
                "Island {} did not improve on its last {} results, stopping it",
                message.island, self.settings.window
            );
            self.stopped.insert(message.island.clone());
            stop_training(self.notifier.as_ref(), &self.endpoints, &message.island).await;
            return Ok(());
        }

        self.record(message);
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), Error> {
        self.combine_results().await
    }
}
