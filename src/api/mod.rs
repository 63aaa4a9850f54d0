//! Operator-facing REST surface (§6). A thin `axum` router over shared
//! `Arc` state; every handler returns the small `{ ok, data|error }`
//! envelope spec.md's "exit 0 on success, non-2xx carries a human
//! message" wording implies.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::algorithms::{ActionMap, AlgorithmCategory};
use crate::device_registry::{DeviceConfig, DeviceRegistry};
use crate::modeler::Modeler;
use crate::scheduler::RRMScheduler;

#[derive(Clone)]
pub struct ApiState {
    pub modeler: Modeler,
    pub registry: DeviceRegistry,
    pub scheduler: Arc<RRMScheduler>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/currentModel", get(current_model))
        .route("/api/v1/getDeviceConfig", get(get_device_config))
        .route("/api/v1/setDeviceApConfig", put(set_device_config))
        .route("/api/v1/setDeviceZoneConfig", put(set_device_config))
        .route("/api/v1/setDeviceNetworkConfig", put(set_device_config))
        .route("/api/v1/topology", get(get_topology).put(set_topology))
        .route("/api/v1/optimizeChannel", post(optimize_channel))
        .route("/api/v1/optimizeTxPower", post(optimize_tx_power))
        .route("/api/v1/runRRM", post(run_rrm))
        .route("/api/v1/algorithms", get(list_algorithms))
        .with_state(state)
}

#[derive(Serialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> Envelope<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            ok: true,
            data: Some(data),
            error: None,
        })
    }
}

fn err_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(Envelope::<()> {
            ok: false,
            data: None,
            error: Some(message.into()),
        }),
    )
        .into_response()
}

async fn current_model(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.modeler.data_model_copy();
    Envelope::ok(serde_json::json!({
        "serials": snapshot.serials().collect::<Vec<_>>(),
        "managedBssidCount": snapshot.managed_bssids().len(),
    }))
}

#[derive(Deserialize)]
struct SerialQuery {
    serial: String,
}

async fn get_device_config(
    State(state): State<ApiState>,
    Query(q): Query<SerialQuery>,
) -> axum::response::Response {
    match state.registry.get(&q.serial) {
        Some(cfg) => Envelope::ok(cfg).into_response(),
        None => err_response(StatusCode::NOT_FOUND, format!("unknown serial {}", q.serial)),
    }
}

async fn set_device_config(
    State(state): State<ApiState>,
    Json(cfg): Json<DeviceConfig>,
) -> axum::response::Response {
    state.registry.upsert(cfg);
    Envelope::ok(Value::Null).into_response()
}

#[derive(Serialize)]
struct TopologyView {
    zones: HashMap<String, Vec<String>>,
}

/// `GET /api/v1/topology`: the registry's current zone→serials layout.
async fn get_topology(State(state): State<ApiState>) -> impl IntoResponse {
    let mut zones: HashMap<String, Vec<String>> = HashMap::new();
    for device in state.registry.all() {
        zones.entry(device.zone).or_default().push(device.serial);
    }
    Envelope::ok(TopologyView { zones })
}

#[derive(Deserialize)]
struct TopologyUpdate {
    zones: HashMap<String, Vec<String>>,
}

/// `PUT /api/v1/topology`: reassign each listed serial to its zone.
/// Serials not already in the registry are reported as errors rather
/// than silently provisioned — zone membership doesn't create devices.
async fn set_topology(
    State(state): State<ApiState>,
    Json(update): Json<TopologyUpdate>,
) -> axum::response::Response {
    let mut unknown = Vec::new();
    for (zone, serials) in update.zones {
        for serial in serials {
            if !state.registry.set_zone(&serial, zone.clone()) {
                unknown.push(serial);
            }
        }
    }
    if unknown.is_empty() {
        Envelope::ok(Value::Null).into_response()
    } else {
        err_response(
            StatusCode::NOT_FOUND,
            format!("unknown serials: {}", unknown.join(", ")),
        )
    }
}

#[derive(Deserialize)]
struct OptimizeQuery {
    zone: String,
    #[serde(default)]
    #[serde(rename = "dryRun")]
    dry_run: bool,
}

async fn optimize_channel(
    State(state): State<ApiState>,
    Query(q): Query<OptimizeQuery>,
) -> axum::response::Response {
    run_category(&state, &q.zone, AlgorithmCategory::Channel, q.dry_run).await
}

async fn optimize_tx_power(
    State(state): State<ApiState>,
    Query(q): Query<OptimizeQuery>,
) -> axum::response::Response {
    run_category(&state, &q.zone, AlgorithmCategory::Tpc, q.dry_run).await
}

async fn run_rrm(
    State(state): State<ApiState>,
    Query(q): Query<OptimizeQuery>,
) -> axum::response::Response {
    let results = state.scheduler.trigger_all(&q.zone, q.dry_run).await;
    let errors: Vec<String> = results
        .iter()
        .filter_map(|r| r.as_ref().err().map(|e| e.to_string()))
        .collect();
    if errors.is_empty() {
        Envelope::ok(Value::Null).into_response()
    } else {
        err_response(StatusCode::INTERNAL_SERVER_ERROR, errors.join("; "))
    }
}

async fn run_category(
    state: &ApiState,
    zone: &str,
    category: AlgorithmCategory,
    dry_run: bool,
) -> axum::response::Response {
    match state.scheduler.trigger(zone, category, dry_run).await {
        Ok(action_map) => Envelope::ok(action_map_to_json(&action_map)).into_response(),
        Err(e) => err_response(StatusCode::CONFLICT, e.to_string()),
    }
}

fn action_map_to_json(action_map: &ActionMap) -> Value {
    match action_map {
        ActionMap::Tpc(map) => serde_json::to_value(map).unwrap_or(Value::Null),
        ActionMap::Channel(map) => serde_json::to_value(map).unwrap_or(Value::Null),
        ActionMap::ClientSteering(map) => serde_json::to_value(map).unwrap_or(Value::Null),
    }
}

async fn list_algorithms(State(_state): State<ApiState>) -> impl IntoResponse {
    let registry = crate::algorithms::AlgorithmRegistry::new();
    Envelope::ok(registry.listing())
}
