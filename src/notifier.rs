use crate::error::Error;
use crate::island::IslandId;
use async_trait::async_trait;
use log::trace;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Outbound HTTP calls to training islands.
///
/// Both calls resolve to the response status code. Only transport failures are
/// errors; interpreting the status is up to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn get(&self, url: &str) -> Result<u16, Error>;

    async fn post(&self, url: &str, body: &Value) -> Result<u16, Error>;
}

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Addresses of the endpoints every island serves, following the
/// `<island>.<domain>` naming convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IslandEndpoints {
    domain: String,
}

impl IslandEndpoints {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    pub fn migrant(&self, island: &IslandId) -> String {
        format!("http://{}.{}/migrant", island, self.domain)
    }

    pub fn stop_training(&self, island: &IslandId) -> String {
        format!("http://{}.{}/stop_training", island, self.domain)
    }
}

pub struct HttpNotifier {
    client: Client,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn get(&self, url: &str) -> Result<u16, Error> {
        let response = self.client.get(url).send().await?;
        trace!("GET {} -> {}", url, response.status());
        Ok(response.status().as_u16())
    }

    async fn post(&self, url: &str, body: &Value) -> Result<u16, Error> {
        let response = self.client.post(url).json(body).send().await?;
        trace!("POST {} -> {}", url, response.status());
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls() {
        let endpoints = IslandEndpoints::new("python-service.default.svc.cluster.local:5000");
        let island: IslandId = "4".parse().unwrap();

        assert_eq!(
            endpoints.migrant(&island),
            "http://4.python-service.default.svc.cluster.local:5000/migrant"
        );
        assert_eq!(
            endpoints.stop_training(&island),
            "http://4.python-service.default.svc.cluster.local:5000/stop_training"
        );
    }

    #[test]
    fn success_range() {
        assert!(is_success(200));
        assert!(is_success(204));
        assert!(!is_success(301));
        assert!(!is_success(404));
        assert!(!is_success(503));
    }
}
