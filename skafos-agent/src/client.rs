//! Outbound HTTP calls this agent makes: registering itself with the
//! controller on boot, and pushing a config to one of its sidecar
//! proxies.

use std::time::Duration;

use serde::Serialize;
use skafos_core::Config;

const REGISTER_TIMEOUT: Duration = Duration::from_secs(1);
const PROXY_PUSH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct RegisterSelfRequest<'a> {
    address: &'a str,
    port: u16,
}

/// Registers this agent with the controller, with a 1 second deadline; a
/// failure here is fatal at startup since an unregistered agent will
/// never receive rules.
pub async fn register_self(controller_addr: &str, self_addr: &str, self_port: u16) -> Result<(), reqwest::Error> {
    let client = reqwest::Client::new();
    let url = format!("http://{controller_addr}/agents");
    client
        .post(url)
        .json(&RegisterSelfRequest { address: self_addr, port: self_port })
        .timeout(REGISTER_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

/// Pushes a full config to one proxy's config-push port. Logged and
/// swallowed by the caller on failure, matching `applyConfigToOneProxy`.
pub async fn push_config_to_proxy(ip: &str, port: u16, config: &Config) -> Result<(), reqwest::Error> {
    let client = reqwest::Client::new();
    let url = format!("http://{ip}:{port}");
    client.post(url).json(config).timeout(PROXY_PUSH_TIMEOUT).send().await?;
    Ok(())
}
