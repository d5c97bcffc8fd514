//! Outbound calls the controller makes to an agent's RPC surface.

use std::time::Duration;

use skafos_core::{Config, SandboxInfo};

const RULE_PUSH_TIMEOUT: Duration = Duration::from_secs(6);
const PROXY_PUSH_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(serde::Serialize)]
struct CreateProxyRequest<'a> {
    sandboxes: &'a [SandboxInfo],
}

/// Pushes a merged rule config to an agent's `/rules` endpoint.
pub async fn update_rule(agent_url: &str, config: &Config) -> Result<(), reqwest::Error> {
    reqwest::Client::new()
        .post(format!("http://{agent_url}/rules"))
        .json(config)
        .timeout(RULE_PUSH_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

/// Asks an agent to set up sidecar proxies for the given sandboxes.
pub async fn create_proxy(agent_url: &str, sandboxes: &[SandboxInfo]) -> Result<(), reqwest::Error> {
    reqwest::Client::new()
        .post(format!("http://{agent_url}/proxies"))
        .json(&CreateProxyRequest { sandboxes })
        .timeout(PROXY_PUSH_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}
