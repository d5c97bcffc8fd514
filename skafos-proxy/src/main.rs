//! Skafos data-plane proxy.
//!
//! Runs two listeners: the pingora-driven data plane on `16000` (plain
//! HTTP/1.x forwarding, routed by the compiled rule table) and an
//! actix-web config-push endpoint on `16001` that an agent POSTs a full
//! `Config` to.

mod app;
mod config_server;
mod engine;

use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;
use clap::Parser;
use pingora::prelude::Opt;
use pingora::server::{RunArgs, Server};

use crate::app::MeshProxy;
use crate::engine::CompiledConfig;

#[derive(Parser, Debug)]
#[command(name = "skafos-proxy", about = "Skafos service-mesh data-plane proxy")]
struct Cli {
    /// Address:port for the data-plane listener.
    #[arg(long, default_value_t = format!("0.0.0.0:{}", skafos_core::ports::PROXY_DATA))]
    data_addr: String,

    /// Address:port for the config-push listener.
    #[arg(long, default_value_t = format!("0.0.0.0:{}", skafos_core::ports::PROXY_CONFIG))]
    config_addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("RUST_LOG", std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    env_logger::init();

    let cli = Cli::parse();

    let rules: Arc<ArcSwap<CompiledConfig>> = Arc::new(ArcSwap::from_pointee(CompiledConfig::default()));

    let data_addr = cli.data_addr.clone();
    let proxy_rules = rules.clone();
    let data_plane = thread::spawn(move || {
        let opt = Some(Opt::default());
        let mut server = Server::new(opt).expect("failed to create pingora server");
        server.bootstrap();

        let mut service = pingora::proxy::http_proxy_service(&server.configuration, MeshProxy::new(proxy_rules));
        service.add_tcp(&data_addr);

        server.add_services(vec![Box::new(service)]);
        log::info!("data plane listening on {data_addr}");
        server.run(RunArgs::default());
    });

    log::info!("config server listening on {}", cli.config_addr);
    config_server::run(cli.config_addr, rules).await?;

    data_plane.join().ok();
    Ok(())
}
