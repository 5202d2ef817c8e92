//! API endpoints for the SDN mitigation controller.
//!
//! This module exposes controller state over HTTP and hosts the platform
//! bridge through which an out-of-process OpenFlow stack feeds events in and
//! collects the commands queued for each switch.

use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use log::error;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::core::mitigation::BlockRecord;
use crate::core::ControllerState;
use crate::models::Config;
use crate::platform::{BridgeEvent, DeviceId, PlatformBridge, PlatformEvent, PortNo};
use crate::utils::seconds_between;

pub struct ApiState {
    pub controller: Arc<ControllerState>,
    pub events: mpsc::Sender<PlatformEvent>,
    pub bridge: Arc<PlatformBridge>,
    pub metrics: Option<PrometheusHandle>,
    pub config: Arc<Config>,
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health_check)))
            .service(web::resource("/devices").route(web::get().to(list_devices)))
            .service(web::resource("/devices/{id}/outbox").route(web::get().to(device_outbox)))
            .service(web::resource("/ports").route(web::get().to(list_ports)))
            .service(web::resource("/mitigation").route(web::get().to(mitigation_status)))
            .service(web::resource("/events").route(web::post().to(post_event))),
    )
    .service(web::resource("/metrics").route(web::get().to(render_metrics)));
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Port sample with its age
#[derive(Serialize)]
struct PortView {
    device_id: DeviceId,
    port_no: PortNo,
    rx_bytes: u64,
    tx_bytes: u64,
    rx_throughput: Option<f64>,
    tx_throughput: Option<f64>,
    age_seconds: f64,
}

#[derive(Serialize)]
struct WatchView {
    device_id: DeviceId,
    ports: Vec<PortNo>,
}

#[derive(Serialize)]
struct MitigationView {
    static_threshold: f64,
    watchlist: Vec<WatchView>,
    blocked: Vec<BlockRecord>,
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_devices(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.controller.registry.list().await)
}

async fn list_ports(state: web::Data<ApiState>) -> impl Responder {
    let now = Utc::now();
    let ports: Vec<PortView> = state
        .controller
        .stats
        .snapshot()
        .await
        .into_iter()
        .map(|r| PortView {
            device_id: r.device_id,
            port_no: r.port_no,
            rx_bytes: r.sample.rx_bytes,
            tx_bytes: r.sample.tx_bytes,
            rx_throughput: r.sample.rx_throughput,
            tx_throughput: r.sample.tx_throughput,
            age_seconds: seconds_between(r.sample.timestamp, now),
        })
        .collect();
    HttpResponse::Ok().json(ports)
}

async fn mitigation_status(state: web::Data<ApiState>) -> impl Responder {
    let watchlist = state
        .controller
        .watchlist
        .snapshot()
        .await
        .into_iter()
        .map(|(device_id, ports)| WatchView { device_id, ports })
        .collect();
    HttpResponse::Ok().json(MitigationView {
        static_threshold: state.config.mitigation.static_threshold,
        watchlist,
        blocked: state.controller.blocks.snapshot().await,
    })
}

/// Platform bridge: accept one event from the OpenFlow stack
async fn post_event(state: web::Data<ApiState>, event: web::Json<BridgeEvent>) -> impl Responder {
    let event = event.into_inner();
    if let BridgeEvent::DeviceLeft { device_id } = &event {
        state.bridge.forget(*device_id).await;
    }
    let event = state.bridge.accept(event).await;

    match state.events.send(event).await {
        Ok(()) => HttpResponse::Accepted().finish(),
        Err(e) => {
            error!("Event loop is gone, dropping {:?}", e.0);
            HttpResponse::ServiceUnavailable().json(ErrorResponse {
                message: "controller is shutting down".to_string(),
            })
        }
    }
}

/// Platform bridge: hand over the commands queued for a device
async fn device_outbox(state: web::Data<ApiState>, path: web::Path<DeviceId>) -> impl Responder {
    let device_id = path.into_inner();
    match state.bridge.drain(device_id).await {
        Some(messages) => HttpResponse::Ok().json(messages),
        None => HttpResponse::NotFound().json(ErrorResponse {
            message: format!("no bridge session for device {}", device_id),
        }),
    }
}

async fn render_metrics(state: web::Data<ApiState>) -> impl Responder {
    match &state.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}
