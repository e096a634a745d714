//! Sensor link: the read loop and the per-line processing pipeline.
//!
//! Lines are handled strictly in arrival order: decode, stabilizer
//! decision, then on replacement the full downstream chain — counters and
//! history first, evaluation and alerting next, auto-irrigation last. A
//! skipped frame does no work at all; dashboard clients poll the unchanged
//! stable state. A bad line never stops the ones behind it.

use tokio::io::AsyncReadExt;
use tokio::select;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::controller::{check_auto_irrigation, PumpAction};
use crate::db::Db;
use crate::evaluate::{
    evaluate_gas, evaluate_humidity, evaluate_soil, evaluate_temperature, evaluate_ultrasonic,
    Channel, ChannelEvaluation, Severity,
};
use crate::framing::LineFramer;
use crate::protocol::{decode_line, DecodedLine, SensorFrame};
use crate::pump::PumpSlot;
use crate::stabilizer::{Decision, Stabilizer};
use crate::state::{now_ms, ConnectionState, EventKind, SharedState};
use crate::transport::LineReader;

/// Long-lived read loop for the sensor Arduino. Terminates when the stream
/// closes, errors, or the cancel flag flips; it never auto-reconnects.
pub async fn run_sensor_loop(
    mut reader: LineReader,
    shared: SharedState,
    db: Option<Db>,
    pump: PumpSlot,
    mut cancel: watch::Receiver<bool>,
) {
    let stabilizer = Stabilizer::new();
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 512];

    loop {
        select! {
            _ = cancel.changed() => {
                debug!("sensor loop cancelled");
                let mut st = shared.write().await;
                st.sensor_link.state = ConnectionState::Disconnected;
                st.record_event(EventKind::System, "sensors disconnected".to_string());
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!("sensor stream closed by peer");
                    let mut st = shared.write().await;
                    st.sensor_link.state = ConnectionState::Disconnected;
                    st.record_event(EventKind::System, "sensor stream closed".to_string());
                    break;
                }
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).to_string();
                    for line in framer.push(&chunk) {
                        handle_sensor_line(&shared, db.as_ref(), &pump, &stabilizer, &line, now_ms())
                            .await;
                    }
                }
                Err(e) => {
                    warn!("sensor read interrupted: {e}");
                    let mut st = shared.write().await;
                    st.sensor_link.state = ConnectionState::Error;
                    st.sensor_link.detail = Some(e.to_string());
                    st.record_event(EventKind::Error, format!("sensor read interrupted: {e}"));
                    break;
                }
            },
        }
    }
}

/// Process one line from the sensor stream.
pub async fn handle_sensor_line(
    shared: &SharedState,
    db: Option<&Db>,
    pump: &PumpSlot,
    stabilizer: &Stabilizer,
    line: &str,
    now_ms: i64,
) {
    let frame = match decode_line(line) {
        DecodedLine::Frame(f) => f,
        DecodedLine::PumpAck { .. } => {
            debug!("pump ack on the sensor link, ignoring");
            return;
        }
        DecodedLine::Empty => return,
        DecodedLine::Unrecognized => {
            debug!(line, "unrecognized sensor line");
            return;
        }
    };

    let mut delivered = Vec::new();
    let action = {
        let mut st = shared.write().await;
        st.sensor_link.last_rx_ms = Some(now_ms);

        if stabilizer.decide(&st.stable, &frame, now_ms) == Decision::Skip {
            return;
        }

        stabilizer.apply(&mut st.stable, &frame, now_ms);
        st.counters.total_readings += 1;
        st.push_history(frame);

        let thresholds = st.thresholds;
        for (channel, value, eval) in evaluate_frame(&frame, &thresholds) {
            if value > 0.0 {
                st.tally.bump(eval.level);
            }
            if eval.should_alert && value > 0.0 {
                let message = format!("{}: {}", channel.display_name(), eval.message);
                if st.notify(Some(channel), eval.alert_severity, message, now_ms) {
                    delivered.extend(st.alerts.back().cloned());
                }
            }
        }

        check_auto_irrigation(
            st.stable.soil,
            &st.thresholds.plant,
            st.pump.intended,
            st.mode,
            st.emergency_stop,
        )
        // Lock dropped here; actuation happens outside the critical section.
    };

    if let Some(action) = action {
        actuate(shared, pump, action, now_ms).await;
    }

    if let Some(db) = db {
        // Best-effort: a persistence hiccup must not stall the stream.
        if let Err(e) = db.insert_reading(now_ms, &frame).await {
            warn!("db: insert_reading failed: {e}");
        }
        for alert in &delivered {
            if let Err(e) = db.insert_alert(alert).await {
                warn!("db: insert_alert failed: {e}");
            }
        }
    }
}

/// Evaluate all five channels against the current thresholds.
fn evaluate_frame(
    frame: &SensorFrame,
    t: &crate::thresholds::Thresholds,
) -> [(Channel, f64, ChannelEvaluation); 5] {
    [
        (Channel::Gas, frame.gas, evaluate_gas(frame.gas, &t.gas)),
        (
            Channel::Ultrasonic,
            frame.ultrasonic,
            evaluate_ultrasonic(frame.ultrasonic, &t.ultrasonic),
        ),
        (Channel::Soil, frame.soil, evaluate_soil(frame.soil, &t.plant)),
        (
            Channel::Temperature,
            frame.temperature,
            evaluate_temperature(frame.temperature, &t.plant),
        ),
        (
            Channel::Humidity,
            frame.humidity,
            evaluate_humidity(frame.humidity, &t.plant),
        ),
    ]
}

/// Drive the pump through its command path and report the outcome.
async fn actuate(shared: &SharedState, pump: &PumpSlot, action: PumpAction, now_ms: i64) {
    let handle = pump.read().await.clone();
    let Some(handle) = handle else {
        debug!("auto irrigation wanted the pump, but no pump link is up");
        return;
    };

    let on = action == PumpAction::TurnOn;
    match handle.set_pump(on).await {
        Ok(_) => {
            let mut st = shared.write().await;
            let (severity, message) = if on {
                (Severity::Success, "Auto irrigation started - dry soil detected")
            } else {
                (Severity::Warning, "Auto irrigation stopped - soil saturated")
            };
            st.notify(Some(Channel::Soil), severity, message.to_string(), now_ms);
        }
        Err(e) => {
            let mut st = shared.write().await;
            st.notify(
                None,
                Severity::Danger,
                format!("Failed to send pump command: {e}"),
                now_ms,
            );
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
