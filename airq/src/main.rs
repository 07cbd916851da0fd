use airq::config::Config;
use airq::device::Device;
use airq::{metrics, mqtt, rest};
use axum::{routing::get, Router};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting air-Q poller");
    info!("Appliance: {}:{}", config.address, config.port);
    info!("Poll interval: {}s", config.poll_interval);
    info!("HTTP server: {}", config.http_addr);

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
        std::process::exit(1);
    }

    let device = Arc::new(Device::new(config.device_settings()));
    if let Err(e) = device.start().await {
        error!("Failed to start polling: {}", e);
        std::process::exit(1);
    }

    let mqtt_handle = match config.mqtt_broker.clone() {
        Some(broker) => {
            let client_id = format!("airq-poller-{}", uuid::Uuid::new_v4());
            let publisher = Arc::clone(device.publisher());
            let port = config.mqtt_port;
            let prefix = config.mqtt_topic_prefix.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = mqtt::run_mqtt(broker, port, client_id, prefix, publisher).await {
                    error!("MQTT task failed: {}", e);
                }
            }))
        }
        None => {
            info!("No MQTT broker configured, state is only served over HTTP");
            None
        }
    };

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(Arc::clone(&device)));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    let mqtt_finished = async {
        match mqtt_handle {
            Some(handle) => {
                let _ = handle.await;
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = mqtt_finished => {
            error!("MQTT task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    device.stop().await;
    info!("Shutting down");
}

async fn metrics_handler() -> String {
    metrics::gather_metrics().unwrap_or_else(|e| {
        error!("Failed to gather metrics: {}", e);
        String::new()
    })
}
