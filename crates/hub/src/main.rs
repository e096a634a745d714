mod alerts;
mod config;
mod controller;
mod db;
mod evaluate;
mod framing;
mod links;
mod plants;
mod protocol;
mod pump;
mod sensor;
mod stabilizer;
mod state;
mod thresholds;
mod transport;
mod web;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::db::Db;
use crate::links::LinkManager;
use crate::state::{EventKind, SystemState};
use crate::transport::Endpoint;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = if std::path::Path::new(&config_path).exists() {
        config::load(&config_path)?
    } else {
        info!("no config file at {config_path}, using defaults");
        config::Config::default()
    };

    // ── Database ────────────────────────────────────────────────────
    let db_url = env::var("DB_URL").unwrap_or_else(|_| cfg.persistence.db_url.clone());
    let db = Db::connect(&db_url).await?;
    db.init_schema().await?;

    // ── Shared state: config defaults, then the persisted snapshot ──
    let shared = SystemState::shared(cfg.thresholds);
    match db.load_snapshot().await {
        Ok(Some(saved)) => {
            shared.write().await.restore(saved);
            info!("state snapshot restored");
        }
        Ok(None) => {}
        Err(e) => warn!("db: load_snapshot failed: {e}"),
    }
    {
        let mut st = shared.write().await;
        st.record_event(EventKind::System, "hub started".to_string());
    }

    // ── Device links ────────────────────────────────────────────────
    let sensor_spec =
        env::var("SENSOR_PORT").unwrap_or_else(|_| cfg.devices.sensor_endpoint.clone());
    let pump_spec = env::var("PUMP_PORT").unwrap_or_else(|_| cfg.devices.pump_endpoint.clone());
    let baud = cfg.devices.baud;

    let sensor_endpoint = parse_endpoint("sensor", &sensor_spec, baud);
    let pump_endpoint = parse_endpoint("pump", &pump_spec, baud);

    let links = LinkManager::new(
        Arc::clone(&shared),
        Some(db.clone()),
        sensor_endpoint,
        pump_endpoint,
    );

    // Initial connection attempts are best-effort; the dashboard has
    // connect buttons for manual retries.
    if let Err(e) = links.connect_sensors().await {
        warn!("sensors not connected at startup: {e}");
    }
    if let Err(e) = links.connect_pump().await {
        warn!("pump not connected at startup: {e}");
    }

    // ── Periodic state snapshot ─────────────────────────────────────
    {
        let shared = Arc::clone(&shared);
        let db = db.clone();
        let every = Duration::from_secs(cfg.persistence.snapshot_every_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                let snapshot = shared.read().await.snapshot();
                if let Err(e) = db.save_snapshot(&snapshot).await {
                    warn!("db: periodic save_snapshot failed: {e}");
                }
            }
        });
    }

    // ── Web dashboard ───────────────────────────────────────────────
    let web_port = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(cfg.web.port);

    let app = web::AppState {
        shared,
        db: Some(db),
        pump: links.pump_slot(),
        links,
    };
    web::serve(app, web_port).await
}

fn parse_endpoint(name: &str, spec: &str, baud: u32) -> Option<Endpoint> {
    if spec.trim().is_empty() {
        info!("no {name} endpoint configured");
        return None;
    }
    match Endpoint::parse(spec, baud) {
        Ok(e) => Some(e),
        Err(err) => {
            warn!("bad {name} endpoint '{spec}': {err}");
            None
        }
    }
}
