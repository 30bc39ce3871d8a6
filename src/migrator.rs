use crate::error::Error;
use crate::island::IslandId;
use crate::message::{MigrantPayload, ResultMessage};
use crate::notifier::{is_success, IslandEndpoints, Notifier};
use crate::worker::Handler;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

pub const MIGRATOR_NAME: &str = "migrator";

/// Forwards every reported individual to the next island on a static ring.
pub struct Migrator {
    total_islands: usize,
    endpoints: IslandEndpoints,
    notifier: Arc<dyn Notifier>,
}

impl Migrator {
    pub fn new(
        total_islands: usize,
        endpoints: IslandEndpoints,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, Error> {
        if total_islands == 0 {
            return Err(Error::InvalidConfig {
                option: "total_islands",
                reason: "ring must contain at least one island".to_string(),
            });
        }

        Ok(Self {
            total_islands,
            endpoints,
            notifier,
        })
    }

    pub fn total_islands(&self) -> usize {
        self.total_islands
    }

    pub fn find_recipient(&self, island_id: &str) -> Result<IslandId, Error> {
        Ok(island_id.parse::<IslandId>()?.successor(self.total_islands))
    }
}

#[async_trait]
impl Handler for Migrator {
    fn name(&self) -> &str {
        MIGRATOR_NAME
    }

    async fn handle(&mut self, message: &ResultMessage) -> Result<(), Error> {
        let recipient = self.find_recipient(message.island.name())?;
        let url = self.endpoints.migrant(&recipient);
        let body = serde_json::to_value(MigrantPayload::from(message))?;

        let status = self.notifier.post(&url, &body).await?;
        if is_success(status) {
            debug!(
                "Migrated individual with fitness {} from island {} to island {}",
                message.fitness, message.island, recipient
            );
        } else {
            warn!(
                "Island {} answered migration from island {} with status {}",
                recipient, message.island, status
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Call, RecordingNotifier};
    use serde_json::json;

    fn migrator(total_islands: usize, notifier: Arc<RecordingNotifier>) -> Migrator {
        Migrator::new(total_islands, IslandEndpoints::new("islands.test"), notifier).unwrap()
    }

    fn message(body: &str) -> ResultMessage {
        ResultMessage::from_json(body).unwrap()
    }

    #[test]
    fn recipient_is_ring_successor() {
        let migrator = migrator(10, Arc::new(RecordingNotifier::default()));

        assert_eq!(migrator.total_islands(), 10);
        assert_eq!(migrator.find_recipient("3").unwrap().name(), "4");
        assert_eq!(migrator.find_recipient("9").unwrap().name(), "0");
        assert_eq!(migrator.find_recipient("island-5").unwrap().name(), "island-6");
    }

    #[test]
    fn recipient_requires_numeric_suffix() {
        let migrator = migrator(10, Arc::new(RecordingNotifier::default()));
        assert!(matches!(
            migrator.find_recipient("head"),
            Err(Error::InvalidIslandId { .. })
        ));
    }

    #[test]
    fn empty_ring_rejected() {
        let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::default());
        assert!(matches!(
            Migrator::new(0, IslandEndpoints::new("islands.test"), notifier),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn posts_individual_to_successor() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut migrator = migrator(10, notifier.clone());

        migrator
            .handle(&message(
                r#"{"fitness":4,"hostname":"3","hyperparameters":{"h1":"test","h2":"test"}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(
            notifier.calls(),
            vec![Call::Post {
                url: "http://4.islands.test/migrant".to_string(),
                body: json!({"fitness": 4, "hyperparameters": {"h1": "test", "h2": "test"}}),
            }]
        );
    }

    #[tokio::test]
    async fn single_island_migrates_to_itself() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut migrator = migrator(1, notifier.clone());

        migrator
            .handle(&message(r#"{"fitness":1,"hostname":"0"}"#))
            .await
            .unwrap();

        assert_eq!(notifier.urls(), vec!["http://0.islands.test/migrant"]);
    }

    #[tokio::test]
    async fn rejected_migration_is_not_an_error() {
        let notifier = Arc::new(RecordingNotifier::with_status(503));
        let mut migrator = migrator(4, notifier.clone());

        let result = migrator
            .handle(&message(r#"{"fitness":1,"hostname":"2"}"#))
            .await;

        assert!(result.is_ok());
        assert_eq!(notifier.urls(), vec!["http://3.islands.test/migrant"]);
    }

    #[tokio::test]
    async fn unreachable_recipient_is_reported() {
        let notifier = Arc::new(RecordingNotifier::unreachable());
        let mut migrator = migrator(4, notifier);

        let result = migrator
            .handle(&message(r#"{"fitness":1,"hostname":"2"}"#))
            .await;

        assert!(result.is_err());
    }
}
