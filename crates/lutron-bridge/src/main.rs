//! Lutron Bridge - HTTP and WebSocket API for a Lutron repeater

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use lip_protocol::ProtocolError;
use lutron_core::{CoordinatorUpdate, CoreError, LutronSystem, SystemStatus, UpdateCoordinator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod websocket;

use config::BridgeConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub system: Arc<LutronSystem>,
    pub coordinator: Arc<UpdateCoordinator<SystemStatus>>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn not_found(what: &str, id: u32) -> ApiResult {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(format!("{what} {id} not found"))),
    )
}

/// Map a device-layer error onto an HTTP status
fn core_error(e: CoreError) -> ApiResult {
    let status = match &e {
        CoreError::OutputNotFound(_) | CoreError::KeypadNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::InvalidLevel(_) => StatusCode::BAD_REQUEST,
        CoreError::Protocol(ProtocolError::NotConnected) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

/// System info response
#[derive(Serialize)]
struct SystemInfo {
    name: String,
    version: String,
    #[serde(flatten)]
    status: SystemStatus,
    last_refresh: CoordinatorUpdate<()>,
}

/// Set sysvar request
#[derive(Deserialize)]
struct SysvarRequest {
    value: i64,
}

/// Set level request
#[derive(Deserialize)]
struct LevelRequest {
    level: f64,
    /// Fade time in seconds
    #[serde(default)]
    fade: Option<f64>,
}

/// Get system info
async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    let refresh = state.coordinator.current();
    Json(ApiResponse::success(SystemInfo {
        name: "Lutron Bridge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: state.system.status(),
        last_refresh: CoordinatorUpdate {
            data: None,
            last_update_success: refresh.last_update_success,
            last_error: refresh.last_error,
            updated_at: refresh.updated_at,
        },
    }))
}

/// List all outputs
async fn list_outputs(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.system.registry().outputs()))
}

/// Get a specific output
async fn get_output(State(state): State<AppState>, Path(id): Path<u32>) -> impl IntoResponse {
    match state.system.registry().output(id) {
        Some(output) => ok(output),
        None => not_found("Output", id),
    }
}

/// Set an output level
async fn set_level(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(req): Json<LevelRequest>,
) -> impl IntoResponse {
    let fade = match req.fade.map(Duration::try_from_secs_f64).transpose() {
        Ok(fade) => fade,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Invalid fade time")),
            )
        }
    };

    match state.system.set_level(id, req.level, fade).await {
        Ok(()) => ok(serde_json::json!({
            "action": "level",
            "integration_id": id,
            "level": req.level
        })),
        Err(e) => core_error(e),
    }
}

/// Turn output on
async fn output_on(State(state): State<AppState>, Path(id): Path<u32>) -> impl IntoResponse {
    match state.system.turn_on(id).await {
        Ok(()) => ok(serde_json::json!({ "action": "on", "integration_id": id })),
        Err(e) => core_error(e),
    }
}

/// Turn output off
async fn output_off(State(state): State<AppState>, Path(id): Path<u32>) -> impl IntoResponse {
    match state.system.turn_off(id).await {
        Ok(()) => ok(serde_json::json!({ "action": "off", "integration_id": id })),
        Err(e) => core_error(e),
    }
}

/// List all keypads
async fn list_keypads(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.system.registry().keypads()))
}

/// Get a specific keypad
async fn get_keypad(State(state): State<AppState>, Path(id): Path<u32>) -> impl IntoResponse {
    match state.system.registry().keypad(id) {
        Some(keypad) => ok(keypad),
        None => not_found("Keypad", id),
    }
}

/// Tap a keypad button
async fn press_button(
    State(state): State<AppState>,
    Path((id, component)): Path<(u32, u32)>,
) -> impl IntoResponse {
    match state.system.press_button(id, component).await {
        Ok(()) => ok(serde_json::json!({
            "action": "press",
            "integration_id": id,
            "component": component
        })),
        Err(e) => core_error(e),
    }
}

/// List occupancy groups
async fn list_groups(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.system.registry().groups()))
}

/// List system variables
async fn list_sysvars(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.system.registry().sysvars()))
}

/// Set a system variable
async fn set_sysvar(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(req): Json<SysvarRequest>,
) -> impl IntoResponse {
    match state.system.set_sysvar(id, req.value).await {
        Ok(()) => ok(serde_json::json!({
            "action": "sysvar",
            "integration_id": id,
            "value": req.value
        })),
        Err(e) => core_error(e),
    }
}

/// Re-query every known device now
async fn refresh(State(state): State<AppState>) -> impl IntoResponse {
    state.coordinator.request_refresh();
    ok(serde_json::json!({ "status": "refresh_requested" }))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lutron_bridge=debug,lip_protocol=debug,lutron_core=info,info".into()
            }),
        )
        .init();

    tracing::info!("Starting Lutron Bridge");

    let config = BridgeConfig::from_env()?;

    tracing::info!("Connecting to repeater at {}", config.lip.address());
    let system = Arc::new(LutronSystem::new(config.lip.clone(), Some(config.inventory_path())).await);

    match system.connection().wait_connected(Duration::from_secs(10)).await {
        Ok(()) => tracing::info!("Logged in to repeater"),
        Err(e) => tracing::warn!("Repeater not reachable yet ({}), retrying in background", e),
    }

    let coordinator = {
        let system = Arc::clone(&system);
        UpdateCoordinator::start("repeater", config.refresh_interval, move || {
            let system = Arc::clone(&system);
            async move { system.refresh().await.map(|_| system.status()) }
        })
    };

    let state = AppState {
        system: Arc::clone(&system),
        coordinator: Arc::new(coordinator),
    };

    // Build the router
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/system/info", get(system_info))
        .route("/api/v1/outputs", get(list_outputs))
        .route("/api/v1/outputs/:id", get(get_output))
        .route("/api/v1/outputs/:id/level", post(set_level))
        .route("/api/v1/outputs/:id/on", post(output_on))
        .route("/api/v1/outputs/:id/off", post(output_off))
        .route("/api/v1/keypads", get(list_keypads))
        .route("/api/v1/keypads/:id", get(get_keypad))
        .route(
            "/api/v1/keypads/:id/buttons/:component/press",
            post(press_button),
        )
        .route("/api/v1/groups", get(list_groups))
        .route("/api/v1/sysvars", get(list_sysvars))
        .route("/api/v1/sysvars/:id", post(set_sysvar))
        .route("/api/v1/refresh", post(refresh))
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("Listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    system.shutdown().await;
    Ok(())
}
