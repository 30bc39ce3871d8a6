use crate::error::Error;
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;
use log::trace;
use std::time::Duration;

/// A message as it comes off the queue, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub body: String,
    pub delivery_handle: Option<String>,
}

/// Receive/delete capability of the result queue.
///
/// Received messages stay invisible to other consumers until deleted or until
/// the queue redelivers them, so deletion is the commit point of processing.
#[async_trait]
pub trait ResultQueue: Send + Sync {
    async fn receive(
        &self,
        max_messages: i32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, Error>;

    async fn delete(&self, delivery_handle: &str) -> Result<(), Error>;
}

pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }

    /// Builds a client from the default AWS provider chain.
    pub async fn from_env(queue_url: String) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config), queue_url)
    }
}

#[async_trait]
impl ResultQueue for SqsQueue {
    async fn receive(
        &self,
        max_messages: i32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, Error> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_time.as_secs() as i32)
            .send()
            .await
            .map_err(|err| Error::Queue(DisplayErrorContext(&err).to_string()))?;

        let messages: Vec<ReceivedMessage> = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|message| ReceivedMessage {
                body: message.body.unwrap_or_default(),
                delivery_handle: message.receipt_handle,
            })
            .collect();

        trace!("Received {} messages from {}", messages.len(), self.queue_url);

        Ok(messages)
    }

    async fn delete(&self, delivery_handle: &str) -> Result<(), Error> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(delivery_handle)
            .send()
            .await
            .map_err(|err| Error::Queue(DisplayErrorContext(&err).to_string()))?;

        Ok(())
    }
}
