//! The agent's own RPC surface: `POST /proxies` (CreateProxy) and
//! `POST /rules` (UpdateRule), both JSON-over-HTTP per the transport
//! decision recorded for this rewrite.

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use log::error;
use serde::Deserialize;
use skafos_core::{Config, SandboxInfo};

use crate::proxy_manager::{ProxyContainer, ProxyManager};
use crate::rule_cache::RuleGeneratorCache;
use crate::runtime::ContainerRuntime;

pub struct AgentState {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub rule_cache: Arc<RuleGeneratorCache>,
    pub proxy_manager: Arc<ProxyManager>,
}

#[derive(Deserialize)]
pub struct CreateProxyRequest {
    pub sandboxes: Vec<SandboxInfo>,
}

/// Sets up a sidecar proxy for every listed sandbox: create, start,
/// install the redirect rules, record it, and if rules already exist push
/// them to the new proxy immediately so it doesn't wait for the next
/// controller tick.
pub async fn create_proxy(state: web::Data<AgentState>, body: web::Json<CreateProxyRequest>) -> HttpResponse {
    let mut status = 0;
    for sandbox in &body.sandboxes {
        if let Err(err) = setup_one_proxy(&state, sandbox).await {
            error!("failed to set up proxy for {}: {err}", sandbox.sandbox_name);
            status = -1;
        }
    }
    HttpResponse::Ok().json(serde_json::json!({ "status": status }))
}

async fn setup_one_proxy(state: &AgentState, sandbox: &SandboxInfo) -> Result<(), crate::error::AgentError> {
    let container_id = state.runtime.create_sidecar(&sandbox.sandbox_name).await?;
    state.runtime.start_sidecar(&container_id).await?;
    state.runtime.install_redirect(&sandbox.sandbox_name).await?;

    state.proxy_manager.set_proxy(ProxyContainer {
        id: container_id,
        ip: sandbox.sandbox_ip.clone(),
        sandbox_name: sandbox.sandbox_name.clone(),
    });

    if state.rule_cache.has_rules() {
        let config = state.rule_cache.dump_config();
        if let Err(err) = crate::client::push_config_to_proxy(&sandbox.sandbox_ip, skafos_core::ports::PROXY_CONFIG, &config).await {
            error!("failed to apply proxy rule to skproxy at {}: {err}", sandbox.sandbox_ip);
        }
    }
    Ok(())
}

/// Merges the incoming config into the rule cache, then re-pushes the
/// full merged view to every known proxy on this node.
pub async fn update_rule(state: web::Data<AgentState>, body: web::Json<Config>) -> HttpResponse {
    state.rule_cache.apply(&body);
    let config = state.rule_cache.dump_config();

    let mut status = 0;
    for proxy in state.proxy_manager.get_proxies() {
        if let Err(err) = crate::client::push_config_to_proxy(&proxy.ip, skafos_core::ports::PROXY_CONFIG, &config).await {
            error!("failed to apply proxy rule to skproxy {}: {err}", proxy.id);
            status = -1;
        }
    }
    HttpResponse::Ok().json(serde_json::json!({ "status": status }))
}
