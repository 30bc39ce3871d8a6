use crate::error::Error;
use crate::island::IslandId;
use crate::queue::ReceivedMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Hyperparameters = Map<String, Value>;

/// One fitness evaluation reported by one island.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub fitness: i64,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
    #[serde(rename = "hostname")]
    pub island: IslandId,
    #[serde(skip)]
    pub delivery_handle: Option<String>,
}

impl ResultMessage {
    pub fn from_json(body: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn from_received(received: ReceivedMessage) -> Result<Self, Error> {
        let mut message = Self::from_json(&received.body)?;
        message.delivery_handle = received.delivery_handle;
        Ok(message)
    }
}

/// Body of the request that hands an individual over to the next island.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrantPayload {
    pub fitness: i64,
    pub hyperparameters: Hyperparameters,
}

impl From<&ResultMessage> for MigrantPayload {
    fn from(message: &ResultMessage) -> Self {
        Self {
            fitness: message.fitness,
            hyperparameters: message.hyperparameters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_wire_format() {
        let received = ReceivedMessage {
            body: r#"{"fitness":4,"hostname":"1","hyperparameters":{"h1":"test"}}"#.to_string(),
            delivery_handle: Some("handle".to_string()),
        };

        let message = ResultMessage::from_received(received).unwrap();

        assert_eq!(message.fitness, 4);
        assert_eq!(message.island.name(), "1");
        assert_eq!(message.hyperparameters.get("h1"), Some(&json!("test")));
        assert_eq!(message.delivery_handle.as_deref(), Some("handle"));
    }

    #[test]
    fn hyperparameters_default_to_empty() {
        let message = ResultMessage::from_json(r#"{"fitness":-2,"hostname":"island-0"}"#).unwrap();
        assert!(message.hyperparameters.is_empty());
        assert_eq!(message.fitness, -2);
    }

    #[test]
    fn invalid_json_rejected() {
        assert!(matches!(
            ResultMessage::from_json("{not json"),
            Err(Error::InvalidJson(_))
        ));
    }

    #[test]
    fn missing_fitness_rejected() {
        assert!(ResultMessage::from_json(r#"{"hostname":"1"}"#).is_err());
    }

    #[test]
    fn hostname_without_index_rejected() {
        assert!(ResultMessage::from_json(r#"{"fitness":1,"hostname":"head-node"}"#).is_err());
    }

    #[test]
    fn delivery_handle_never_serialized() {
        let mut message = ResultMessage::from_json(r#"{"fitness":1,"hostname":"2"}"#).unwrap();
        message.delivery_handle = Some("secret".to_string());

        let serialized = serde_json::to_value(&message).unwrap();

        assert_eq!(
            serialized,
            json!({"fitness": 1, "hyperparameters": {}, "hostname": "2"})
        );
    }

    #[test]
    fn migrant_payload_carries_fitness_and_hyperparameters() {
        let message = ResultMessage::from_json(
            r#"{"fitness":9,"hostname":"3","hyperparameters":{"lr":0.1,"layers":[1,2]}}"#,
        )
        .unwrap();

        let payload = serde_json::to_value(MigrantPayload::from(&message)).unwrap();

        assert_eq!(
            payload,
            json!({"fitness": 9, "hyperparameters": {"lr": 0.1, "layers": [1, 2]}})
        );
    }
}
