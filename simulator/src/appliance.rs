use crate::telemetry::{generate_sample, SampleContext};
use airq::crypto::{self, Key};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct ApplianceConfig {
    pub password: String,
    pub standard_password: bool,
    pub device_id: String,
    pub warm_up: Duration,
    pub door_rate: f64,
}

/// A pretend air-Q: answers the local API with encrypted envelopes.
pub struct Appliance {
    key: Key,
    standard_password: bool,
    device_id: String,
    warm_up: Duration,
    door_rate: f64,
    booted: Mutex<Instant>,
    settings: Mutex<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RequestForm {
    request: String,
}

impl Appliance {
    pub fn new(config: ApplianceConfig) -> Self {
        let mut settings = Map::new();
        settings.insert("id".into(), json!(config.device_id));
        settings.insert("devicename".into(), json!("air-Q Simulator"));
        settings.insert("TimeServer".into(), json!("pool.ntp.org"));
        settings.insert("SecondsMeasurementDelay".into(), json!(120.0));
        settings.insert("Wifi".into(), json!(true));

        Self {
            key: crypto::derive_key(&config.password),
            standard_password: config.standard_password,
            device_id: config.device_id,
            warm_up: config.warm_up,
            door_rate: config.door_rate,
            booted: Mutex::new(Instant::now()),
            settings: Mutex::new(settings),
        }
    }

    fn seal(&self, document: &Value) -> String {
        crypto::encrypt(&document.to_string(), &self.key)
    }

    fn open(&self, blob: &str) -> Result<Value, ApiError> {
        let plain = crypto::decrypt(blob, &self.key).map_err(|e| {
            warn!("Rejected request: {}", e);
            ApiError::BadRequest("Decryption failed")
        })?;
        serde_json::from_str(&plain).map_err(|_| ApiError::BadRequest("Invalid JSON"))
    }

    async fn uptime(&self) -> Duration {
        self.booted.lock().await.elapsed()
    }

    async fn reset(&self) {
        *self.booted.lock().await = Instant::now();
        info!("Simulated reboot");
    }

    /// Applies one key the way the firmware does: known numeric keys only
    /// accept numbers, everything else is stored as sent.
    async fn apply_setting(&self, key: &str, value: &Value) -> String {
        let mut settings = self.settings.lock().await;
        if let Some(current) = settings.get(key) {
            if current.is_number() && !value.is_number() {
                return format!(
                    "Error: key '{}' must be in format of 'float', but received was '{}'",
                    key, value
                );
            }
        }
        settings.insert(key.to_string(), value.clone());
        format!("Success: new setting saved for key '{}': {}", key, value)
    }
}

pub fn create_router(appliance: Arc<Appliance>) -> Router {
    Router::new()
        .route("/standardpass", get(standard_pass))
        .route("/version", get(version))
        .route("/ping", get(ping))
        .route("/config", get(get_config).post(set_config))
        .route("/data", get(data))
        .route("/blink", get(blink))
        .route("/playsound", post(play_sound))
        .with_state(appliance)
}

async fn standard_pass(State(appliance): State<Arc<Appliance>>) -> String {
    appliance.standard_password.to_string()
}

async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION"), "hardware": "simulator" }))
}

async fn ping(State(appliance): State<Arc<Appliance>>) -> Json<Value> {
    let uptime = appliance.uptime().await.as_secs();
    let content = appliance.seal(&json!({ "id": appliance.device_id, "uptime": uptime }));
    Json(json!({ "id": appliance.device_id, "content": content }))
}

async fn get_config(State(appliance): State<Arc<Appliance>>) -> Json<Value> {
    let settings = Value::Object(appliance.settings.lock().await.clone());
    Json(json!({ "content": appliance.seal(&settings) }))
}

async fn set_config(
    State(appliance): State<Arc<Appliance>>,
    Form(form): Form<RequestForm>,
) -> Result<Json<Value>, ApiError> {
    let patch = match appliance.open(&form.request)? {
        Value::Object(patch) => patch,
        _ => return Err(ApiError::BadRequest("Expected a JSON object")),
    };

    let reply = if patch.get("reset").and_then(Value::as_bool) == Some(true) {
        appliance.reset().await;
        "Success: reboot initialized".to_string()
    } else {
        let mut lines = Vec::with_capacity(patch.len());
        for (key, value) in &patch {
            lines.push(appliance.apply_setting(key, value).await);
        }
        lines.join("\n")
    };

    debug!("Config reply: {}", reply);
    Ok(Json(json!({ "content": appliance.seal(&Value::String(reply)) })))
}

async fn data(State(appliance): State<Arc<Appliance>>) -> Json<Value> {
    let uptime = appliance.uptime().await;
    let warm_up_remaining = appliance.warm_up.saturating_sub(uptime).as_secs();

    let sample = {
        let mut rng = rand::thread_rng();
        generate_sample(
            &mut rng,
            &SampleContext {
                device_id: &appliance.device_id,
                uptime: uptime.as_secs(),
                warm_up_remaining,
                door_rate: appliance.door_rate,
            },
        )
    };

    Json(json!({ "content": appliance.seal(&sample) }))
}

async fn blink(State(appliance): State<Arc<Appliance>>) -> Json<Value> {
    info!("Blinking LEDs");
    Json(json!({ "id": appliance.device_id }))
}

async fn play_sound(
    State(appliance): State<Arc<Appliance>>,
    Form(form): Form<RequestForm>,
) -> Result<String, ApiError> {
    let request = appliance.open(&form.request)?;
    info!("Playing sound {}", request);
    Ok(crypto::encrypt("playback finished", &appliance.key))
}

enum ApiError {
    BadRequest(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appliance(warm_up: Duration) -> Appliance {
        Appliance::new(ApplianceConfig {
            password: "mypw".to_string(),
            standard_password: false,
            device_id: "sim-0001".to_string(),
            warm_up,
            door_rate: 0.0,
        })
    }

    #[tokio::test]
    async fn test_numeric_setting_rejects_text() {
        let appliance = appliance(Duration::ZERO);
        let reply = appliance
            .apply_setting("SecondsMeasurementDelay", &json!("soon"))
            .await;
        assert!(reply.starts_with("Error: key 'SecondsMeasurementDelay'"));

        let reply = appliance.apply_setting("SecondsMeasurementDelay", &json!(60)).await;
        assert_eq!(
            reply,
            "Success: new setting saved for key 'SecondsMeasurementDelay': 60"
        );
    }

    #[tokio::test]
    async fn test_sealed_documents_open_with_same_password() {
        let appliance = appliance(Duration::ZERO);
        let blob = appliance.seal(&json!({ "reset": true }));
        let key = crypto::derive_key("mypw");
        assert_eq!(crypto::decrypt(&blob, &key).unwrap(), r#"{"reset":true}"#);
        assert!(appliance.open(&blob).is_ok());
    }

    #[tokio::test]
    async fn test_wrong_password_is_bad_request() {
        let appliance = appliance(Duration::ZERO);
        let blob = crypto::encrypt("{}", &crypto::derive_key("other"));
        assert!(matches!(
            appliance.open(&blob),
            Err(ApiError::BadRequest("Decryption failed"))
        ));
    }

    #[tokio::test]
    async fn test_reset_restarts_uptime() {
        let appliance = appliance(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        appliance.reset().await;
        assert!(appliance.uptime().await < Duration::from_millis(20));
    }
}
