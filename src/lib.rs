pub mod collector;
pub mod config;
pub mod error;
pub mod island;
pub mod message;
pub mod metrics;
pub mod migrator;
pub mod monitor;
pub mod notifier;
pub mod queue;
pub mod signal;
pub mod store;
pub mod testutil;
pub mod worker;
