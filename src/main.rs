//! SDN Mitigation Controller
//!
//! This is the main entry point for the controller.
//! It initializes the controller core and starts the HTTP API and platform bridge.

use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use log::{info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use sdn_mitigation_controller::api::{self, ApiState};
use sdn_mitigation_controller::config;
use sdn_mitigation_controller::core::Controller;
use sdn_mitigation_controller::platform::PlatformBridge;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting SDN mitigation controller...");

    // Load configuration
    let config = Arc::new(config::load_config()?);

    // Prometheus recorder for the controller's metrics
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    // Start the controller tasks
    let mut controller = Controller::new(config.as_ref().clone());
    controller.start().await?;

    // Create API state
    let state = web::Data::new(ApiState {
        controller: controller.state(),
        events: controller.events(),
        bridge: Arc::new(PlatformBridge::new()),
        metrics,
        config: config.clone(),
    });

    // Start HTTP server; it returns once a shutdown signal arrives
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::config)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run();
    let result = server.await;

    controller.stop().await;
    result?;
    Ok(())
}
