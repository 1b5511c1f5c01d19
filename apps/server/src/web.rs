use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use reflow_core::{
    Command, CommandError, OvenSnapshot, Profile, ProfileStore, RunStatus, StoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock as AsyncRwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::control::ControlHandle;

// Shared state between the control loop and the web server
#[derive(Clone)]
pub struct WebState {
    pub server_state: Arc<AsyncRwLock<ServerState>>,
    pub control: ControlHandle,
    pub store: Arc<dyn ProfileStore>,
}

#[derive(Clone, Serialize)]
pub struct ServerState {
    pub snapshot: OvenSnapshot,
    pub temperature_history: Vec<TemperaturePoint>,
}

impl ServerState {
    pub fn new(snapshot: OvenSnapshot) -> Self {
        ServerState {
            snapshot,
            temperature_history: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct TemperaturePoint {
    pub timestamp: i64,
    pub temperature: Option<f64>,
    pub target: Option<f64>,
    pub heater_on: bool,
}

#[derive(Deserialize)]
pub struct StartRequest {
    name: String,
}

#[derive(Deserialize)]
pub struct TargetRequest {
    value_c: f64,
}

#[derive(Deserialize)]
pub struct CurveQuery {
    start_c: Option<f64>,
    step_s: Option<f64>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    last_update: Option<i64>,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/profiles", get(list_profiles).post(save_profile))
        .route("/api/profiles/:name", get(get_profile).delete(delete_profile))
        .route("/api/profiles/:name/curve", get(get_profile_curve))
        .route("/api/profile/start", post(start_profile))
        .route("/api/stop", post(stop))
        .route("/api/target", post(set_target))
        .route("/api/history", get(get_history))
        .route("/api/history/clear", post(clear_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: tokio::net::TcpListener, state: WebState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Starting web server on http://{}", addr);
    }
    axum::serve(listener, router(state)).await
}

fn status_for(err: &CommandError) -> StatusCode {
    match err {
        CommandError::InvalidProfile(_) | CommandError::TargetOutOfRange { .. } => {
            StatusCode::BAD_REQUEST
        }
        CommandError::CannotStart(_) => StatusCode::CONFLICT,
        CommandError::NotFound(_) => StatusCode::NOT_FOUND,
        CommandError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: CommandError) -> Response {
    (
        status_for(&err),
        Json(json!({
            "success": false,
            "error": err.code(),
            "message": err.to_string(),
        })),
    )
        .into_response()
}

fn success(mut body: Value) -> Response {
    if let Value::Object(fields) = &mut body {
        fields.insert("success".to_string(), Value::Bool(true));
    }
    Json(body).into_response()
}

// Store calls touch the disk; keep them off the runtime thread.
async fn with_store<T, F>(state: &WebState, f: F) -> Result<T, CommandError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ProfileStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| CommandError::Storage(e.to_string()))?
        .map_err(CommandError::from)
}

async fn get_status(State(state): State<WebState>) -> Json<OvenSnapshot> {
    Json(state.server_state.read().await.snapshot.clone())
}

async fn list_profiles(State(state): State<WebState>) -> Response {
    match with_store(&state, |store| store.list()).await {
        Ok(names) => Json(names).into_response(),
        Err(e) => failure(e),
    }
}

async fn get_profile(State(state): State<WebState>, Path(name): Path<String>) -> Response {
    match with_store(&state, move |store| store.load(&name)).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => failure(e),
    }
}

// Nominal curve for graphing, ramping from ambient unless told otherwise.
async fn get_profile_curve(
    State(state): State<WebState>,
    Path(name): Path<String>,
    Query(query): Query<CurveQuery>,
) -> Response {
    let start_c = query.start_c.unwrap_or(25.0);
    let step_s = query.step_s.unwrap_or(10.0).max(1.0);
    match with_store(&state, move |store| store.load(&name)).await {
        Ok(profile) => success(json!({
            "name": profile.name,
            "points": profile.nominal_curve(start_c, step_s),
        })),
        Err(e) => failure(e),
    }
}

async fn save_profile(State(state): State<WebState>, Json(profile): Json<Profile>) -> Response {
    let name = profile.name.clone();
    match with_store(&state, move |store| store.save(&profile)).await {
        Ok(()) => success(json!({ "name": name })),
        Err(e) => failure(e),
    }
}

async fn delete_profile(State(state): State<WebState>, Path(name): Path<String>) -> Response {
    let key = name.clone();
    if let Err(e) = with_store(&state, move |store| store.delete(&key)).await {
        return failure(e);
    }

    let running = {
        let server_state = state.server_state.read().await;
        let snapshot = &server_state.snapshot;
        snapshot.run_status == RunStatus::Running
            && snapshot.profile_name.as_deref() == Some(name.as_str())
    };
    if running {
        info!("Profile '{}' deleted while running, stopping", name);
        if let Err(e) = state.control.send(Command::Stop).await {
            return failure(e);
        }
    }
    success(json!({ "name": name, "stopped": running }))
}

async fn start_profile(
    State(state): State<WebState>,
    Json(request): Json<StartRequest>,
) -> Response {
    let name = request.name;
    let profile = match with_store(&state, move |store| store.load(&name)).await {
        Ok(profile) => profile,
        Err(e) => return failure(e),
    };
    match state.control.send(Command::StartProfile(profile)).await {
        Ok(outcome) => success(json!({ "result": outcome })),
        Err(e) => failure(e),
    }
}

async fn stop(State(state): State<WebState>) -> Response {
    match state.control.send(Command::Stop).await {
        Ok(outcome) => success(json!({ "result": outcome })),
        Err(e) => failure(e),
    }
}

async fn set_target(
    State(state): State<WebState>,
    Json(request): Json<TargetRequest>,
) -> Response {
    match state
        .control
        .send(Command::SetManualTarget(request.value_c))
        .await
    {
        Ok(outcome) => success(json!({ "result": outcome })),
        Err(e) => failure(e),
    }
}

async fn get_history(
    State(state): State<WebState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<TemperaturePoint>> {
    let server_state = state.server_state.read().await;
    // With last_update, only points newer than what the client already has
    let points = match query.last_update {
        Some(last_update) => server_state
            .temperature_history
            .iter()
            .filter(|point| point.timestamp > last_update)
            .cloned()
            .collect(),
        None => server_state.temperature_history.clone(),
    };
    Json(points)
}

async fn clear_history(State(state): State<WebState>) -> Response {
    state.server_state.write().await.temperature_history.clear();
    success(json!({}))
}
