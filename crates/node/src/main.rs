//! Development-time stand-in for the two rig Arduinos.
//!
//! Speaks the exact wire protocol over TCP line streams so the hub can be
//! exercised with no hardware attached:
//! - sensor side: newline-delimited JSON frames at a fixed sample rate
//! - pump side: `ON`/`OFF`/`AUTO_MODE_*` commands, answered with the same
//!   confirmation lines the firmware prints, plus a periodic JSON status
//!
//! Both sides share one simulator, so switching the pump on actually raises
//! the simulated soil moisture — the hub's bang-bang loop closes end to end.
//!
//! Env config: `ROLE` (rig|sensors|pump), `SENSOR_LISTEN`, `PUMP_LISTEN`,
//! `SAMPLE_EVERY_MS`, `SIM_SCENARIO` (drying|stable|flaky|wet).

mod sim;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sim::{GardenSim, Scenario};

type SharedSim = Arc<Mutex<GardenSim>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let role = env::var("ROLE").unwrap_or_else(|_| "rig".to_string());
    let sensor_listen =
        env::var("SENSOR_LISTEN").unwrap_or_else(|_| "127.0.0.1:7001".to_string());
    let pump_listen = env::var("PUMP_LISTEN").unwrap_or_else(|_| "127.0.0.1:7002".to_string());
    let sample_every_ms: u64 = env::var("SAMPLE_EVERY_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(500);
    let scenario = Scenario::from_str_lossy(
        &env::var("SIM_SCENARIO").unwrap_or_default(),
    );

    info!(%role, %scenario, sample_every_ms, "rig node starting");

    let shared: SharedSim = Arc::new(Mutex::new(GardenSim::new(scenario)));

    let mut tasks = Vec::new();
    if role == "rig" || role == "sensors" {
        let sim = Arc::clone(&shared);
        let listen = sensor_listen.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = sensor_side(&listen, sim, sample_every_ms).await {
                warn!("sensor side failed: {e:#}");
            }
        }));
    }
    if role == "rig" || role == "pump" {
        let sim = Arc::clone(&shared);
        let listen = pump_listen.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = pump_side(&listen, sim).await {
                warn!("pump side failed: {e:#}");
            }
        }));
    }
    anyhow::ensure!(!tasks.is_empty(), "unknown ROLE '{role}' (use rig|sensors|pump)");

    for t in tasks {
        let _ = t.await;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sensor Arduino
// ---------------------------------------------------------------------------

async fn sensor_side(listen: &str, sim: SharedSim, sample_every_ms: u64) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("bind sensor listener on {listen}"))?;
    info!("sensor side listening on {listen}");

    loop {
        // One client at a time, like a serial port.
        let (stream, peer) = listener.accept().await.context("sensor accept")?;
        info!(%peer, "sensor client connected");
        if let Err(e) = stream_frames(stream, &sim, sample_every_ms).await {
            info!("sensor client gone: {e}");
        }
    }
}

async fn stream_frames(
    mut stream: TcpStream,
    sim: &SharedSim,
    sample_every_ms: u64,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(sample_every_ms));
    loop {
        ticker.tick().await;
        let frame = sim.lock().await.sample();
        let mut line = serde_json::to_string(&frame)?;
        line.push('\n');
        stream.write_all(line.as_bytes()).await?;
    }
}

// ---------------------------------------------------------------------------
// Pump Arduino
// ---------------------------------------------------------------------------

/// Seconds between unsolicited JSON status lines.
const STATUS_EVERY_SECS: u64 = 3;

async fn pump_side(listen: &str, sim: SharedSim) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("bind pump listener on {listen}"))?;
    info!("pump side listening on {listen}");

    loop {
        let (stream, peer) = listener.accept().await.context("pump accept")?;
        info!(%peer, "pump client connected");
        if let Err(e) = serve_pump_client(stream, &sim).await {
            info!("pump client gone: {e}");
        }
        // Fail-safe: relay drops when the controller goes away.
        sim.lock().await.set_watering(false);
    }
}

async fn serve_pump_client(stream: TcpStream, sim: &SharedSim) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut auto_mode = false;
    let mut status_tick =
        tokio::time::interval(Duration::from_secs(STATUS_EVERY_SECS));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { return Ok(()) };
                let reply = match line.trim() {
                    "" => continue,
                    "ON" => {
                        sim.lock().await.set_watering(true);
                        "PUMP ON ✅".to_string()
                    }
                    "OFF" => {
                        sim.lock().await.set_watering(false);
                        "PUMP OFF 🛑".to_string()
                    }
                    "AUTO_MODE_ON" => {
                        auto_mode = true;
                        "OK AUTO_MODE ON".to_string()
                    }
                    "AUTO_MODE_OFF" => {
                        auto_mode = false;
                        "OK AUTO_MODE OFF".to_string()
                    }
                    other => format!("ERR unknown command '{other}'"),
                };
                writer.write_all(format!("{reply}\n").as_bytes()).await?;
            }
            _ = status_tick.tick() => {
                let active = sim.lock().await.watering();
                let status = serde_json::json!({
                    "pump_active": active,
                    "auto_mode": auto_mode,
                });
                writer.write_all(format!("{status}\n").as_bytes()).await?;
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
