//! Skafos controller (cluster singleton): owns rule definitions, polls the
//! orchestrator for pods/services, diffs against its snapshot, regenerates
//! affected rule generators, and drives the fan-out messaging layer that
//! pushes deltas to every registered agent.

mod agent_manager;
mod api;
mod buffer;
mod client;
mod error;
mod messager;
mod orchestrator;
mod pilot;
mod reconciler;
mod rulegen;
mod snapshot;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use clap::Parser;

use crate::orchestrator::{HttpOrchestratorClient, OrchestratorClient};
use crate::pilot::ControllerState;

#[derive(Parser, Debug)]
#[command(name = "skafos-controller", about = "Skafos service-mesh control-plane controller")]
struct Cli {
    /// Port this controller's RPC server listens on.
    #[arg(long, default_value_t = skafos_core::ports::CONTROLLER)]
    port: u16,

    /// Orchestrator inventory endpoint (host only; port is fixed at
    /// `skafos_core::ports::ORCHESTRATOR`).
    #[arg(long, default_value = "localhost")]
    orchestrator_endpoint: String,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    std::env::set_var("RUST_LOG", std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    env_logger::init();

    let cli = Cli::parse();

    let state = Arc::new(ControllerState::new());
    let orchestrator: Arc<dyn OrchestratorClient> = Arc::new(HttpOrchestratorClient::new(&cli.orchestrator_endpoint));

    let reconcile_state = state.clone();
    let reconcile_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        reconciler::run(reconcile_orchestrator.as_ref(), &reconcile_state, reconciler::RECONCILE_INTERVAL).await;
    });

    let messager_state = state.clone();
    tokio::spawn(async move {
        messager::run(&messager_state, messager::MESSAGER_INTERVAL).await;
    });

    let bind_addr = format!("0.0.0.0:{}", cli.port);
    log::info!("skpilot listening at {bind_addr}");

    let app_state = web::Data::from(state);
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .route("/rules/ratio", web::post().to(api::apply_ratio_rule))
            .route("/rules/regex", web::post().to(api::apply_regex_rule))
            .route("/agents", web::post().to(api::register_self))
    })
    .bind(bind_addr)?
    .run()
    .await
}
