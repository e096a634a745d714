//! Browser dashboard: embedded single-page UI plus the JSON control API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::alerts::AlertRecord;
use crate::controller::OperationMode;
use crate::db::Db;
use crate::evaluate::Severity;
use crate::links::LinkManager;
use crate::plants::{self, Region};
use crate::pump::PumpSlot;
use crate::stabilizer::StableReading;
use crate::state::{
    now_ms, HistoryEntry, LinkStatus, PumpState, SharedState, SystemCounters, SystemEvent,
    LevelTally,
};
use crate::thresholds::{GasThresholds, PlantThresholds, Thresholds, UltrasonicThresholds};

const INDEX_HTML: &str = include_str!("ui/index.html");

#[derive(Clone)]
pub struct AppState {
    pub shared: SharedState,
    pub db: Option<Db>,
    pub pump: PumpSlot,
    pub links: Arc<LinkManager>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/api/plants", get(api_plants))
        .route("/api/thresholds/gas", post(api_thresholds_gas))
        .route("/api/thresholds/ultrasonic", post(api_thresholds_ultrasonic))
        .route("/api/thresholds/plant", post(api_thresholds_plant))
        .route("/api/plant-preset", post(api_plant_preset))
        .route("/api/pump", post(api_pump))
        .route("/api/mode", post(api_mode))
        .route("/api/emergency-stop", post(api_emergency_stop))
        .route("/api/connect/{device}", post(api_connect))
        .route("/api/disconnect/{device}", post(api_disconnect))
        .route("/api/clear", post(api_clear))
        .with_state(app)
}

async fn index() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        INDEX_HTML,
    )
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SystemInfo {
    used_memory_mb: u64,
    total_memory_mb: u64,
}

#[derive(Serialize)]
struct StatusResponse {
    uptime: String,
    uptime_secs: u64,
    sensor_link: LinkStatus,
    pump_link: LinkStatus,
    stable: StableReading,
    thresholds: Thresholds,
    pump: PumpState,
    mode: OperationMode,
    emergency_stop: bool,
    counters: SystemCounters,
    tally: LevelTally,
    history: Vec<HistoryEntry>,
    alerts: Vec<AlertRecord>,
    events: Vec<SystemEvent>,
    system: SystemInfo,
}

async fn api_status(State(app): State<AppState>) -> impl IntoResponse {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();

    let st = app.shared.read().await;
    Json(StatusResponse {
        uptime: st.uptime(),
        uptime_secs: st.started_at.elapsed().as_secs(),
        sensor_link: st.sensor_link.clone(),
        pump_link: st.pump_link.clone(),
        stable: st.stable,
        thresholds: st.thresholds,
        pump: st.pump,
        mode: st.mode,
        emergency_stop: st.emergency_stop,
        counters: st.counters,
        tally: st.tally,
        history: st.history.iter().cloned().collect(),
        alerts: st.alerts.iter().rev().cloned().collect(),
        events: st.events.iter().rev().cloned().collect(),
        system: SystemInfo {
            used_memory_mb: sys.used_memory() / (1024 * 1024),
            total_memory_mb: sys.total_memory() / (1024 * 1024),
        },
    })
}

async fn api_plants() -> impl IntoResponse {
    Json(plants::CATALOG)
}

// ---------------------------------------------------------------------------
// Threshold updates
// ---------------------------------------------------------------------------

async fn persist_snapshot(app: &AppState) {
    if let Some(db) = &app.db {
        let snapshot = app.shared.read().await.snapshot();
        if let Err(e) = db.save_snapshot(&snapshot).await {
            tracing::warn!("db: save_snapshot failed: {e}");
        }
    }
}

async fn api_thresholds_gas(
    State(app): State<AppState>,
    Json(new): Json<GasThresholds>,
) -> Result<Json<Thresholds>, (StatusCode, String)> {
    let updated = {
        let mut st = app.shared.write().await;
        st.thresholds
            .update_gas(new)
            .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}")))?;
        st.notify(
            None,
            Severity::Success,
            "Gas thresholds updated".to_string(),
            now_ms(),
        );
        st.thresholds
    };
    persist_snapshot(&app).await;
    Ok(Json(updated))
}

async fn api_thresholds_ultrasonic(
    State(app): State<AppState>,
    Json(new): Json<UltrasonicThresholds>,
) -> Result<Json<Thresholds>, (StatusCode, String)> {
    let updated = {
        let mut st = app.shared.write().await;
        st.thresholds
            .update_ultrasonic(new)
            .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}")))?;
        st.notify(
            None,
            Severity::Success,
            "Tank level thresholds updated".to_string(),
            now_ms(),
        );
        st.thresholds
    };
    persist_snapshot(&app).await;
    Ok(Json(updated))
}

async fn api_thresholds_plant(
    State(app): State<AppState>,
    Json(new): Json<PlantThresholds>,
) -> Result<Json<Thresholds>, (StatusCode, String)> {
    let updated = {
        let mut st = app.shared.write().await;
        st.thresholds
            .update_plant(new)
            .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}")))?;
        st.notify(
            None,
            Severity::Success,
            "Plant thresholds updated".to_string(),
            now_ms(),
        );
        st.thresholds
    };
    persist_snapshot(&app).await;
    Ok(Json(updated))
}

#[derive(Deserialize)]
struct PresetRequest {
    plant: String,
    region: Region,
}

async fn api_plant_preset(
    State(app): State<AppState>,
    Json(req): Json<PresetRequest>,
) -> Result<Json<Thresholds>, (StatusCode, String)> {
    let preset = plants::preset_thresholds(&req.plant, req.region).ok_or((
        StatusCode::NOT_FOUND,
        format!("unknown plant '{}'", req.plant),
    ))?;

    let updated = {
        let mut st = app.shared.write().await;
        st.thresholds
            .update_plant(preset)
            .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}")))?;
        st.notify(
            None,
            Severity::Success,
            format!("Applied {} preset", req.plant),
            now_ms(),
        );
        st.thresholds
    };
    persist_snapshot(&app).await;
    Ok(Json(updated))
}

// ---------------------------------------------------------------------------
// Pump / mode / emergency stop
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PumpRequest {
    on: bool,
}

async fn api_pump(
    State(app): State<AppState>,
    Json(req): Json<PumpRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    {
        let st = app.shared.read().await;
        if st.emergency_stop {
            return Err((
                StatusCode::CONFLICT,
                "system is in emergency stop".to_string(),
            ));
        }
    }

    let handle = app.pump.read().await.clone().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "pump Arduino not connected".to_string(),
    ))?;

    let outcome = handle
        .set_pump(req.on)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    {
        let mut st = app.shared.write().await;
        let (severity, message) = if req.on {
            (Severity::Success, "Pump ON")
        } else {
            (Severity::Warning, "Pump OFF")
        };
        st.notify(None, severity, message.to_string(), now_ms());
    }

    Ok(Json(json!({ "on": req.on, "outcome": format!("{outcome:?}").to_lowercase() })))
}

#[derive(Deserialize)]
struct ModeRequest {
    auto: bool,
}

async fn api_mode(
    State(app): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> impl IntoResponse {
    {
        let mut st = app.shared.write().await;
        st.mode = if req.auto {
            OperationMode::Auto
        } else {
            OperationMode::Manual
        };
        let (severity, message) = if req.auto {
            (Severity::Success, "Automatic mode enabled")
        } else {
            (Severity::Warning, "Manual mode enabled")
        };
        st.notify(None, severity, message.to_string(), now_ms());
    }

    // Let the firmware know, if it is listening. Best-effort.
    if let Some(handle) = app.pump.read().await.clone() {
        if let Err(e) = handle.set_auto_mode(req.auto).await {
            tracing::warn!("auto-mode command failed: {e}");
        }
    }
    persist_snapshot(&app).await;

    Json(json!({ "auto": req.auto }))
}

#[derive(Deserialize)]
struct EmergencyStopRequest {
    active: bool,
}

async fn api_emergency_stop(
    State(app): State<AppState>,
    Json(req): Json<EmergencyStopRequest>,
) -> impl IntoResponse {
    if req.active {
        // Kill the pump first, then latch the stop.
        if let Some(handle) = app.pump.read().await.clone() {
            if let Err(e) = handle.force_off().await {
                tracing::warn!("emergency stop: force-off failed: {e}");
            }
        }
        let mut st = app.shared.write().await;
        st.emergency_stop = true;
        st.mode = OperationMode::Manual;
        st.notify(
            None,
            Severity::Danger,
            "EMERGENCY STOP activated - pump forced off".to_string(),
            now_ms(),
        );
    } else {
        let mut st = app.shared.write().await;
        st.emergency_stop = false;
        st.notify(
            None,
            Severity::Success,
            "Emergency stop cleared".to_string(),
            now_ms(),
        );
    }
    Json(json!({ "active": req.active }))
}

// ---------------------------------------------------------------------------
// Connections / clear
// ---------------------------------------------------------------------------

async fn api_connect(
    State(app): State<AppState>,
    Path(device): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let res = match device.as_str() {
        "sensors" => app.links.connect_sensors().await,
        "pump" => app.links.connect_pump().await,
        other => return Err((StatusCode::NOT_FOUND, format!("unknown device '{other}'"))),
    };
    res.map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
    Ok(Json(json!({ "device": device, "connected": true })))
}

async fn api_disconnect(
    State(app): State<AppState>,
    Path(device): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    match device.as_str() {
        "sensors" => app.links.disconnect_sensors().await,
        "pump" => app.links.disconnect_pump().await,
        other => return Err((StatusCode::NOT_FOUND, format!("unknown device '{other}'"))),
    }
    Ok(Json(json!({ "device": device, "connected": false })))
}

async fn api_clear(State(app): State<AppState>) -> impl IntoResponse {
    {
        let mut st = app.shared.write().await;
        st.clear_data();
    }
    if let Some(db) = &app.db {
        if let Err(e) = db.clear_data().await {
            tracing::warn!("db: clear_data failed: {e}");
        }
    }
    Json(json!({ "cleared": true }))
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

pub async fn serve(app: AppState, port: u16) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("dashboard listening on http://{addr}");
    axum::serve(listener, router(app)).await?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
