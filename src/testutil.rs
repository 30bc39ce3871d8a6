//! Controllable stand-ins for the queue, the island endpoints and the metrics
//! sink.

use crate::error::Error;
use crate::metrics::FitnessSink;
use crate::notifier::Notifier;
use crate::queue::{ReceivedMessage, ResultQueue};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get { url: String },
    Post { url: String, body: Value },
}

impl Call {
    pub fn url(&self) -> &str {
        match self {
            Call::Get { url } | Call::Post { url, .. } => url,
        }
    }
}

/// Records every request and answers with a fixed status, or fails every
/// request when unreachable.
pub struct RecordingNotifier {
    status: Option<u16>,
    calls: Mutex<Vec<Call>>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::with_status(200)
    }
}

impl RecordingNotifier {
    pub fn with_status(status: u16) -> Self {
        Self {
            status: Some(status),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            status: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls().iter().map(|call| call.url().to_string()).collect()
    }

    pub fn get_urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Get { url } => Some(url),
                Call::Post { .. } => None,
            })
            .collect()
    }

    pub fn post_urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Post { url, .. } => Some(url),
                Call::Get { .. } => None,
            })
            .collect()
    }

    fn respond(&self, call: Call) -> Result<u16, Error> {
        let url = call.url().to_string();
        self.calls.lock().unwrap().push(call);
        self.status.ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} is unreachable", url),
            ))
        })
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn get(&self, url: &str) -> Result<u16, Error> {
        self.respond(Call::Get {
            url: url.to_string(),
        })
    }

    async fn post(&self, url: &str, body: &Value) -> Result<u16, Error> {
        self.respond(Call::Post {
            url: url.to_string(),
            body: body.clone(),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(String, String, f64)>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<(String, String, f64)> {
        self.records.lock().unwrap().clone()
    }
}

impl FitnessSink for RecordingSink {
    fn record(&self, island: &str, phase: &str, fitness: f64) {
        self.records
            .lock()
            .unwrap()
            .push((island.to_string(), phase.to_string(), fitness));
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<ReceivedMessage>,
    in_flight: Vec<ReceivedMessage>,
    deleted: Vec<String>,
    failing_receives: usize,
    receive_calls: usize,
    issued: usize,
}

impl QueueState {
    fn next_handle(&mut self) -> String {
        let handle = format!("handle-{}", self.issued);
        self.issued += 1;
        handle
    }
}

/// In-memory queue. Received messages stay in flight until deleted; an empty
/// receive waits out the long-poll time before returning.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    pub fn with_bodies<I, S>(bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = Self::default();
        for body in bodies {
            queue.push(body);
        }
        queue
    }

    /// Enqueues a body under a fresh delivery handle `handle-<n>`.
    pub fn push(&self, body: impl Into<String>) -> String {
        let mut state = self.state.lock().unwrap();
        let handle = state.next_handle();
        state.pending.push_back(ReceivedMessage {
            body: body.into(),
            delivery_handle: Some(handle.clone()),
        });
        handle
    }

    pub fn push_received(&self, received: ReceivedMessage) {
        self.state.lock().unwrap().pending.push_back(received);
    }

    /// Makes the next `count` receive calls fail.
    pub fn fail_receives(&self, count: usize) {
        self.state.lock().unwrap().failing_receives = count;
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn receive_calls(&self) -> usize {
        self.state.lock().unwrap().receive_calls
    }

    /// Puts every in-flight message back on the queue under a fresh delivery
    /// handle, as an expired visibility timeout would. The old handles can no
    /// longer be deleted. Returns the new handles.
    pub fn redeliver_in_flight(&self) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        let mut handles = Vec::new();
        for mut received in std::mem::take(&mut state.in_flight) {
            let handle = state.next_handle();
            received.delivery_handle = Some(handle.clone());
            state.pending.push_back(received);
            handles.push(handle);
        }
        handles
    }

    /// Polls until at least `count` messages have been deleted.
    pub async fn wait_for_deletions(&self, count: usize) {
        while self.deleted().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Polls until nothing is pending and nothing is in flight.
    pub async fn wait_until_drained(&self) {
        while self.pending() > 0 || self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl ResultQueue for MemoryQueue {
    async fn receive(
        &self,
        max_messages: i32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, Error> {
        let batch = {
            let mut state = self.state.lock().unwrap();
            state.receive_calls += 1;
            if state.failing_receives > 0 {
                state.failing_receives -= 1;
                return Err(Error::Queue("throttled".to_string()));
            }

            let count = state.pending.len().min(max_messages.max(0) as usize);
            let batch: Vec<ReceivedMessage> = state.pending.drain(..count).collect();
            state.in_flight.extend(batch.iter().cloned());
            batch
        };

        if batch.is_empty() {
            tokio::time::sleep(wait_time).await;
        }

        Ok(batch)
    }

    async fn delete(&self, delivery_handle: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .in_flight
            .iter()
            .position(|message| message.delivery_handle.as_deref() == Some(delivery_handle))
            .ok_or_else(|| Error::Queue(format!("unknown delivery handle {}", delivery_handle)))?;
        state.in_flight.remove(position);
        state.deleted.push(delivery_handle.to_string());
        Ok(())
    }
}
