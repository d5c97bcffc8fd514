//! Skafos node-local agent: sets up sidecar proxies for sandboxes the
//! controller tells it about, relays rule pushes to those proxies, and
//! reaps proxies whose sandbox has disappeared.

mod api;
mod client;
mod error;
mod proxy_manager;
mod reaper;
mod rule_cache;
mod runtime;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use clap::Parser;

use crate::proxy_manager::ProxyManager;
use crate::rule_cache::RuleGeneratorCache;
use crate::runtime::{ContainerRuntime, ShellRuntime};

#[derive(Parser, Debug)]
#[command(name = "skafos-agent", about = "Skafos node-local agent")]
struct Cli {
    /// Address this agent is reachable at (registered with the controller).
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// Port this agent's RPC server listens on.
    #[arg(long, default_value_t = skafos_core::ports::AGENT)]
    port: u16,

    /// Controller address:port to register with.
    #[arg(long, default_value_t = format!("127.0.0.1:{}", skafos_core::ports::CONTROLLER))]
    controller_addr: String,

    /// Container CLI to shell out to for sidecar lifecycle.
    #[arg(long, default_value = "docker")]
    container_cli: String,

    /// Path to the redirect-rules script run against each sandbox.
    #[arg(long, default_value = "/usr/local/bin/skafos-redirect.sh")]
    redirect_script: String,

    /// Sidecar proxy image to run.
    #[arg(long, default_value = "skafos/skproxy")]
    proxy_image: String,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    std::env::set_var("RUST_LOG", std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    env_logger::init();

    let cli = Cli::parse();

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(ShellRuntime::new(cli.container_cli.clone(), cli.redirect_script.clone(), cli.proxy_image.clone()));
    let rule_cache = Arc::new(RuleGeneratorCache::new());
    let proxy_manager = Arc::new(ProxyManager::new());

    if let Err(err) = client::register_self(&cli.controller_addr, &cli.address, cli.port).await {
        log::error!("fail to register self to control plane: {err}");
        std::process::exit(1);
    }
    log::info!("registered with controller at {}", cli.controller_addr);

    tokio::spawn(reaper::run(runtime.clone(), proxy_manager.clone()));

    let state = web::Data::new(api::AgentState { runtime, rule_cache, proxy_manager });
    let bind_addr = format!("0.0.0.0:{}", cli.port);
    log::info!("skagent listening at {bind_addr}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/proxies", web::post().to(api::create_proxy))
            .route("/rules", web::post().to(api::update_rule))
    })
    .bind(bind_addr)?
    .run()
    .await
}
