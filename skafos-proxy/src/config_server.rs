//! The proxy's config-push endpoint. An agent POSTs a full `Config` here;
//! it is compiled and swapped into the live rule table atomically. A
//! config that fails to compile is rejected and the previous table stays
//! live.

use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer};
use arc_swap::ArcSwap;
use log::{error, info};
use skafos_core::Config;

use crate::engine::CompiledConfig;

struct AppState {
    rules: Arc<ArcSwap<CompiledConfig>>,
}

async fn push_config(state: web::Data<AppState>, body: web::Json<Config>) -> HttpResponse {
    match CompiledConfig::compile(&body) {
        Ok(compiled) => {
            state.rules.store(Arc::new(compiled));
            info!("config accepted: {} ratio rule(s), {} regex rule(s)", body.ratio_rules.len(), body.regex_rules.len());
            HttpResponse::Ok().json(serde_json::json!({ "status": 0 }))
        }
        Err(err) => {
            error!("rejected config: {err}");
            HttpResponse::Ok().json(serde_json::json!({ "status": -1 }))
        }
    }
}

pub async fn run(addr: String, rules: Arc<ArcSwap<CompiledConfig>>) -> std::io::Result<()> {
    let state = web::Data::new(AppState { rules });
    HttpServer::new(move || {
        App::new().app_data(state.clone()).route("/", web::post().to(push_config))
    })
    .bind(addr)?
    .run()
    .await
}
