//! The controller's operator- and agent-facing RPC surface: `POST
//! /rules/ratio`, `POST /rules/regex` (operator → controller) and `POST
//! /agents` (agent → controller registration), all JSON-over-HTTP. Every
//! response body is `{"status": i32}`.

use actix_web::{web, HttpResponse};
use log::error;
use serde::Deserialize;
use skafos_core::{RatioRule, RegexRule};

use crate::pilot::ControllerState;

fn status_response(status: i32) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": status }))
}

pub async fn apply_ratio_rule(state: web::Data<ControllerState>, body: web::Json<RatioRule>) -> HttpResponse {
    let rule = body.into_inner();
    if let Err(err) = rule.validate() {
        error!("[API] reject ratio rule {}: {err}", rule.name());
        return status_response(-1);
    }
    match state.apply_ratio_rule(rule).await {
        Ok(()) => status_response(0),
        Err(err) => {
            error!("[API] apply ratio rule failed: {err}");
            status_response(-1)
        }
    }
}

pub async fn apply_regex_rule(state: web::Data<ControllerState>, body: web::Json<RegexRule>) -> HttpResponse {
    let rule = body.into_inner();
    if let Err(err) = rule.validate() {
        error!("[API] reject regex rule {}: {err}", rule.name());
        return status_response(-1);
    }
    match state.apply_regex_rule(rule).await {
        Ok(()) => status_response(0),
        Err(err) => {
            error!("[API] apply regex rule failed: {err}");
            status_response(-1)
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterSelfRequest {
    pub address: String,
    pub port: u16,
}

pub async fn register_self(state: web::Data<ControllerState>, body: web::Json<RegisterSelfRequest>) -> HttpResponse {
    state.add_agent(&body.address, body.port).await;
    status_response(0)
}
