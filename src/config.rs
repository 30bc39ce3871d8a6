use crate::collector::CollectorSettings;
use crate::error::Error;
use crate::monitor::MonitorSettings;
use crate::notifier::IslandEndpoints;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::net::SocketAddr;
use std::time::Duration;

const MAX_MESSAGES_LIMIT: i32 = 10;
const MAX_WAIT_TIME_SECS: u64 = 20;

/// Every option can also be set through the environment variable named next
/// to it.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Coordinate island-model training through a result queue", long_about = None)]
pub struct Config {
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    #[arg(long, env = "FIT_QUEUE_URL")]
    pub queue_url: String,

    #[arg(long, env = "TOTAL_ISLANDS")]
    pub total_islands: usize,

    #[arg(long, env = "WORKER_POOL")]
    pub worker_pool: usize,

    #[arg(long, env = "PATIENCE")]
    pub patience: usize,

    /// Defaults to the value of --patience.
    #[arg(long, env = "GLOBAL_PATIENCE")]
    pub global_patience: Option<i64>,

    #[arg(long, env = "MAX_MESSAGES", default_value_t = 10)]
    pub max_messages: i32,

    #[arg(long, env = "WAIT_TIME_SECONDS", default_value_t = 1)]
    pub wait_time_secs: u64,

    #[arg(
        long,
        env = "ISLAND_DOMAIN",
        default_value = "python-service.default.svc.cluster.local:5000"
    )]
    pub island_domain: String,

    #[arg(long, env = "HTTP_TIMEOUT_SECONDS", default_value_t = 10)]
    pub http_timeout_secs: u64,

    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9090")]
    pub metrics_addr: SocketAddr,
}

fn invalid(option: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidConfig {
        option,
        reason: reason.into(),
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        if self.queue_url.trim().is_empty() {
            return Err(invalid("queue_url", "must not be empty"));
        }
        if self.total_islands == 0 {
            return Err(invalid("total_islands", "must be at least 1"));
        }
        if self.worker_pool == 0 {
            return Err(invalid("worker_pool", "must be at least 1"));
        }
        if self.patience == 0 {
            return Err(invalid("patience", "must be at least 1"));
        }
        if self.global_patience.map_or(false, |patience| patience < 0) {
            return Err(invalid("global_patience", "must not be negative"));
        }
        if !(1..=MAX_MESSAGES_LIMIT).contains(&self.max_messages) {
            return Err(invalid(
                "max_messages",
                format!("must be between 1 and {}", MAX_MESSAGES_LIMIT),
            ));
        }
        if self.wait_time_secs > MAX_WAIT_TIME_SECS {
            return Err(invalid(
                "wait_time_secs",
                format!("must not exceed {}", MAX_WAIT_TIME_SECS),
            ));
        }
        if self.island_domain.trim().is_empty() {
            return Err(invalid("island_domain", "must not be empty"));
        }
        if self.http_timeout_secs == 0 {
            return Err(invalid("http_timeout_secs", "must be at least 1"));
        }
        Ok(())
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            max_messages: self.max_messages,
            wait_time: Duration::from_secs(self.wait_time_secs),
            worker_pool: self.worker_pool,
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            window: self.patience,
            global_patience: self
                .global_patience
                .unwrap_or_else(|| i64::try_from(self.patience).unwrap_or(i64::MAX)),
        }
    }

    pub fn endpoints(&self) -> IslandEndpoints {
        IslandEndpoints::new(self.island_domain.clone())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
