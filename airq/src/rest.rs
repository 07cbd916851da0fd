use crate::device::Device;
use crate::model::DeviceState;
use crate::session::{is_rejection, DeviceInfo, Sound};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
struct AppState {
    device: Arc<Device>,
}

#[derive(Debug, Serialize)]
struct CommandResponse {
    message: Value,
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    message: Value,
    rejected: bool,
}

pub fn create_router(device: Arc<Device>) -> Router {
    let state = AppState { device };

    Router::new()
        .route("/api/v1/state", get(get_state))
        .route("/api/v1/info", get(get_info))
        .route("/api/v1/config", post(set_config))
        .route("/api/v1/blink", post(blink))
        .route("/api/v1/reboot", post(reboot))
        .route("/api/v1/playsound", post(play_sound))
        .with_state(state)
}

async fn get_state(State(state): State<AppState>) -> Json<DeviceState> {
    Json(state.device.publisher().current())
}

async fn get_info(State(state): State<AppState>) -> Result<Json<DeviceInfo>, AppError> {
    Ok(Json(state.device.get_info().await?))
}

/// Forwards a JSON object of settings; `rejected` is set when the appliance
/// answered any key with an error.
async fn set_config(
    State(state): State<AppState>,
    Json(patch): Json<Value>,
) -> Result<Json<ConfigResponse>, AppError> {
    let message = state.device.set_config(&patch).await?;
    Ok(Json(ConfigResponse {
        rejected: is_rejection(&message),
        message,
    }))
}

async fn blink(State(state): State<AppState>) -> Result<Json<CommandResponse>, AppError> {
    let id = state.device.blink("api").await?;
    Ok(Json(CommandResponse {
        message: Value::String(id),
    }))
}

async fn reboot(State(state): State<AppState>) -> Result<Json<CommandResponse>, AppError> {
    let message = state.device.reboot("api").await?;
    Ok(Json(CommandResponse { message }))
}

async fn play_sound(
    State(state): State<AppState>,
    Json(sound): Json<Sound>,
) -> Result<Json<CommandResponse>, AppError> {
    let message = state.device.play_sound("api", sound).await?;
    Ok(Json(CommandResponse {
        message: Value::String(message),
    }))
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error: {}", self.0),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
