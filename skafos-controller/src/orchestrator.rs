//! The orchestrator inventory collaborator the reconciler polls. Kept
//! behind a trait so the concrete orchestrator (a full container
//! scheduler) stays out of process, per the Non-goals boundary.

use std::time::Duration;

use async_trait::async_trait;
use skafos_core::{Pod, Service};

const ORCHESTRATOR_TIMEOUT: Duration = Duration::from_secs(1);

#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    async fn get_all_pods(&self) -> Result<Vec<Pod>, reqwest::Error>;

    /// Returns services paired with a parallel list of pod-name lists:
    /// `service_pods[i]` is the set of pod names belonging to
    /// `services[i]`.
    async fn get_all_services(&self) -> Result<(Vec<Service>, Vec<Vec<String>>), reqwest::Error>;
}

/// HTTP+JSON implementation, talking to the orchestrator's inventory API
/// at `http://<endpoint>:<ORCHESTRATOR port>`.
pub struct HttpOrchestratorClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpOrchestratorClient {
    pub fn new(endpoint: &str) -> Self {
        Self { base_url: format!("http://{}:{}", endpoint, skafos_core::ports::ORCHESTRATOR), client: reqwest::Client::new() }
    }
}

#[derive(serde::Deserialize)]
struct ServicesResponse {
    services: Vec<Service>,
    service_pod_names: Vec<Vec<String>>,
}

#[async_trait]
impl OrchestratorClient for HttpOrchestratorClient {
    async fn get_all_pods(&self) -> Result<Vec<Pod>, reqwest::Error> {
        self.client
            .get(format!("{}/pods", self.base_url))
            .timeout(ORCHESTRATOR_TIMEOUT)
            .send()
            .await?
            .json::<Vec<Pod>>()
            .await
    }

    async fn get_all_services(&self) -> Result<(Vec<Service>, Vec<Vec<String>>), reqwest::Error> {
        let resp = self
            .client
            .get(format!("{}/services", self.base_url))
            .timeout(ORCHESTRATOR_TIMEOUT)
            .send()
            .await?
            .json::<ServicesResponse>()
            .await?;
        Ok((resp.services, resp.service_pod_names))
    }
}
