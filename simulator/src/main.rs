mod appliance;
mod telemetry;

use appliance::{Appliance, ApplianceConfig};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Serves the air-Q local API on a regular port for development.
#[derive(Debug, Parser)]
#[command(name = "airq-simulator")]
struct Args {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8081")]
    bind: String,

    /// Empty means the factory default
    #[arg(long, env = "AIRQ_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    #[arg(long, env = "AIRQ_DEVICE_ID", default_value = "sim0000000000000000000000000001")]
    device_id: String,

    /// Seconds the gas sensors report warm-up after boot or reset
    #[arg(long, env = "WARM_UP_SECS", default_value_t = 60)]
    warm_up: u64,

    /// Chance per sample of a door event
    #[arg(long, env = "DOOR_RATE", default_value_t = 0.02, value_parser = parse_probability)]
    door_rate: f64,
}

fn parse_probability(value: &str) -> Result<f64, String> {
    let rate: f64 = value.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("{} is not between 0 and 1", value))
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let standard_password = args.password.is_empty();
    let password = if standard_password {
        airq::session::DEFAULT_PASSWORD.to_string()
    } else {
        args.password
    };

    let appliance = Arc::new(Appliance::new(ApplianceConfig {
        password,
        standard_password,
        device_id: args.device_id,
        warm_up: Duration::from_secs(args.warm_up),
        door_rate: args.door_rate,
    }));

    let listener = match tokio::net::TcpListener::bind(&args.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", args.bind, e);
            std::process::exit(1);
        }
    };

    info!("air-Q simulator listening on {}", args.bind);
    if let Err(e) = axum::serve(listener, appliance::create_router(appliance)).await {
        error!("Server error: {}", e);
    }
}
