use std::io;
use thiserror;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid JSON")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid island id {island_id:?}: expected a numeric suffix")]
    InvalidIslandId { island_id: String },
    #[error("invalid configuration for {option}: {reason}")]
    InvalidConfig {
        option: &'static str,
        reason: String,
    },
    #[error("queue request failed: {}", .0)]
    Queue(String),
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),
    #[error("metrics registration failed")]
    Metrics(#[from] prometheus::Error),
    #[error("no results recorded for training cycle {cycle}")]
    MissingCycle { cycle: u64 },
    #[error("worker {worker:?} stopped before accepting the message")]
    WorkerStopped { worker: String },
    #[error("worker {worker:?} terminated abnormally")]
    WorkerPanicked { worker: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}
