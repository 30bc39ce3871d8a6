use crate::error::Error;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use log::info;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub const TRAINING_PHASE: &str = "training";

/// Destination of per-island fitness observations.
pub trait FitnessSink: Send + Sync {
    fn record(&self, island: &str, phase: &str, fitness: f64);
}

pub struct PrometheusSink {
    gauge: GaugeVec,
}

impl PrometheusSink {
    pub fn register(registry: &Registry) -> Result<Self, Error> {
        let gauge = GaugeVec::new(
            Opts::new("training_gauge", "Latest fitness reported by each island"),
            &["island", "phase"],
        )?;
        registry.register(Box::new(gauge.clone()))?;
        Ok(Self { gauge })
    }
}

impl FitnessSink for PrometheusSink {
    fn record(&self, island: &str, phase: &str, fitness: f64) {
        self.gauge.with_label_values(&[island, phase]).set(fitness);
    }
}

pub fn render(registry: &Registry) -> Result<String, Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, Error> {
    Ok(TcpListener::bind(addr).await?)
}

/// Serves `registry` in the Prometheus text format at `GET /metrics`.
pub async fn serve(listener: TcpListener, registry: Registry) -> Result<(), Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let registry = registry.clone();
            async move {
                match render(&registry) {
                    Ok(body) => (StatusCode::OK, body),
                    Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
                }
            }
        }),
    );

    info!("Serving metrics on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
