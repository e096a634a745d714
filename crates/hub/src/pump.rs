//! Pump link: safety handshake, command path, ack reconciliation.
//!
//! One task owns both halves of the pump connection. Commands arrive over
//! an mpsc channel; inbound bytes are framed and decoded in the same select
//! loop, so lines are processed strictly in arrival order.
//!
//! Safety invariant: the pump must never be left in an unknown or ON state
//! from a prior session. On connect the task settles, forces `OFF`, settles
//! again, and only then reports the link ready — no ON/OFF command is
//! written before that OFF (queued commands wait in the channel).
//!
//! ON/OFF completion is two-phase: after the write succeeds the task holds
//! `Commanding{expected}` and resolves the caller with `Confirmed` when a
//! matching acknowledgment arrives, or `TimedOut` after a bounded wait.
//! `intended` is updated optimistically on write success; if the device
//! later reports a different state, reconciliation forces local intent to
//! match — only the physical device knows ground truth.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::select;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::framing::LineFramer;
use crate::protocol::{decode_line, DecodedLine, PumpWireCommand};
use crate::state::{now_ms, ConnectionState, EventKind, PumpState, SharedState};
use crate::transport::{self, LineReader, LineWriter, TransportError};

/// Settle after opening the port, before the forced OFF.
const CONNECT_SETTLE_MS: u64 = 1000;
/// Settle after the forced OFF, before the link is reported ready.
const HANDSHAKE_SETTLE_MS: u64 = 500;
/// Bounded wait for a device acknowledgment of an ON/OFF command.
const COMMAND_TIMEOUT_MS: u64 = 1500;

/// Swappable handle slot: `None` while no pump link is up. The web layer
/// and the irrigation controller read it; connect/disconnect replace it.
pub type PumpSlot = Arc<RwLock<Option<PumpHandle>>>;

/// How an ON/OFF command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The device acknowledged the expected state.
    Confirmed,
    /// No matching acknowledgment within the bounded wait. Local intent
    /// keeps the optimistic value; reconciliation will catch any drift.
    TimedOut,
}

enum Request {
    SetPump {
        on: bool,
        respond: oneshot::Sender<Result<CommandOutcome, TransportError>>,
    },
    SetAutoMode {
        on: bool,
        respond: oneshot::Sender<Result<(), TransportError>>,
    },
    ForceOff {
        respond: oneshot::Sender<Result<(), TransportError>>,
    },
}

/// Cloneable handle used by the web layer and the irrigation controller.
#[derive(Clone)]
pub struct PumpHandle {
    tx: mpsc::Sender<Request>,
}

impl PumpHandle {
    pub async fn set_pump(&self, on: bool) -> Result<CommandOutcome, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Request::SetPump { on, respond: tx })
            .await
            .map_err(|_| link_down())?;
        rx.await.map_err(|_| link_down())?
    }

    pub async fn set_auto_mode(&self, on: bool) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Request::SetAutoMode { on, respond: tx })
            .await
            .map_err(|_| link_down())?;
        rx.await.map_err(|_| link_down())?
    }

    /// Emergency path: write OFF immediately, no two-phase wait.
    pub async fn force_off(&self) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Request::ForceOff { respond: tx })
            .await
            .map_err(|_| link_down())?;
        rx.await.map_err(|_| link_down())?
    }
}

fn link_down() -> TransportError {
    TransportError::Unavailable("pump link not running".to_string())
}

/// Spawn the pump task over an opened transport. Returns the command handle.
pub fn spawn(
    reader: LineReader,
    writer: LineWriter,
    shared: SharedState,
    cancel: watch::Receiver<bool>,
) -> PumpHandle {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(run(reader, writer, shared, rx, cancel));
    PumpHandle { tx }
}

struct Pending {
    expected: bool,
    started: Instant,
    respond: oneshot::Sender<Result<CommandOutcome, TransportError>>,
}

async fn run(
    mut reader: LineReader,
    mut writer: LineWriter,
    shared: SharedState,
    mut rx: mpsc::Receiver<Request>,
    mut cancel: watch::Receiver<bool>,
) {
    // ── Safety handshake ────────────────────────────────────────────
    tokio::time::sleep(Duration::from_millis(CONNECT_SETTLE_MS)).await;
    if let Err(e) = transport::write_line(&mut writer, PumpWireCommand::Off.token()).await {
        warn!("pump handshake failed: {e}");
        let mut st = shared.write().await;
        st.pump_link.state = ConnectionState::Error;
        st.pump_link.detail = Some(e.to_string());
        st.record_event(EventKind::Error, format!("pump handshake failed: {e}"));
        return;
    }
    tokio::time::sleep(Duration::from_millis(HANDSHAKE_SETTLE_MS)).await;
    {
        let mut st = shared.write().await;
        st.pump = PumpState::default();
        st.pump_link.state = ConnectionState::Connected;
        st.pump_link.detail = None;
        st.record_event(
            EventKind::Pump,
            "pump forced OFF on connect, link ready".to_string(),
        );
    }
    info!("pump link ready (forced OFF on connect)");

    // ── Command / read loop ─────────────────────────────────────────
    let mut framer = LineFramer::new();
    let mut pending: Option<Pending> = None;
    let mut buf = [0u8; 512];
    let mut tick = tokio::time::interval(Duration::from_millis(100));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        select! {
            _ = cancel.changed() => {
                debug!("pump loop cancelled");
                let mut st = shared.write().await;
                st.pump_link.state = ConnectionState::Disconnected;
                st.record_event(EventKind::Pump, "pump disconnected".to_string());
                break;
            }

            req = rx.recv() => match req {
                None => break,
                Some(req) => handle_request(req, &mut writer, &shared, &mut pending).await,
            },

            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!("pump stream closed by peer");
                    let mut st = shared.write().await;
                    st.pump_link.state = ConnectionState::Disconnected;
                    st.record_event(EventKind::Pump, "pump stream closed".to_string());
                    break;
                }
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).to_string();
                    for line in framer.push(&chunk) {
                        handle_pump_line(&shared, &line, &mut pending).await;
                    }
                }
                Err(e) => {
                    warn!("pump read interrupted: {e}");
                    let mut st = shared.write().await;
                    st.pump_link.state = ConnectionState::Error;
                    st.pump_link.detail = Some(e.to_string());
                    st.record_event(EventKind::Error, format!("pump read interrupted: {e}"));
                    break;
                }
            },

            _ = tick.tick() => {
                let timed_out = pending
                    .as_ref()
                    .is_some_and(|p| p.started.elapsed() >= Duration::from_millis(COMMAND_TIMEOUT_MS));
                if timed_out {
                    let p = pending.take().expect("checked above");
                    debug!(expected = p.expected, "pump command unacknowledged, timing out");
                    let _ = p.respond.send(Ok(CommandOutcome::TimedOut));
                }
            }
        }
    }

    if let Some(p) = pending.take() {
        let _ = p
            .respond
            .send(Err(TransportError::ReadInterrupted(
                "pump link closed".to_string(),
            )));
    }
}

async fn handle_request(
    req: Request,
    writer: &mut LineWriter,
    shared: &SharedState,
    pending: &mut Option<Pending>,
) {
    match req {
        Request::SetPump { on, respond } => {
            if pending.is_some() {
                let _ = respond.send(Err(TransportError::WriteFailed(
                    "another pump command in flight".to_string(),
                )));
                return;
            }
            let cmd = if on {
                PumpWireCommand::On
            } else {
                PumpWireCommand::Off
            };
            match transport::write_line(writer, cmd.token()).await {
                Ok(()) => {
                    let mut st = shared.write().await;
                    let was_on = st.pump.intended;
                    st.pump.intended = on;
                    if on && !was_on {
                        st.counters.irrigation_count += 1;
                    }
                    st.record_event(EventKind::Pump, format!("sent {}", cmd.token()));
                    drop(st);
                    *pending = Some(Pending {
                        expected: on,
                        started: Instant::now(),
                        respond,
                    });
                }
                Err(e) => {
                    warn!("pump command write failed: {e}");
                    let _ = respond.send(Err(e));
                }
            }
        }
        Request::SetAutoMode { on, respond } => {
            let cmd = if on {
                PumpWireCommand::AutoModeOn
            } else {
                PumpWireCommand::AutoModeOff
            };
            let res = transport::write_line(writer, cmd.token()).await;
            if res.is_ok() {
                shared
                    .write()
                    .await
                    .record_event(EventKind::Pump, format!("sent {}", cmd.token()));
            }
            let _ = respond.send(res);
        }
        Request::ForceOff { respond } => {
            let res = transport::write_line(writer, PumpWireCommand::Off.token()).await;
            if res.is_ok() {
                let mut st = shared.write().await;
                st.pump.intended = false;
                st.record_event(EventKind::Pump, "forced OFF".to_string());
            }
            let _ = respond.send(res);
        }
    }
}

/// Decode one inbound pump line and fold it into the shared state.
async fn handle_pump_line(shared: &SharedState, line: &str, pending: &mut Option<Pending>) {
    match decode_line(line) {
        DecodedLine::PumpAck { active, structured } => {
            let mut st = shared.write().await;
            st.pump_link.last_rx_ms = Some(now_ms());
            st.pump.confirmed_by_device = active;
            debug!(active, structured, "pump ack");

            if pending.as_ref().is_some_and(|p| p.expected == active) {
                let p = pending.take().expect("checked above");
                let _ = p.respond.send(Ok(CommandOutcome::Confirmed));
            }

            // Drift: the device report is authoritative over local intent.
            if st.pump.confirmed_by_device != st.pump.intended {
                st.pump.intended = active;
                let word = if active { "ON" } else { "OFF" };
                warn!("pump state reconciled to device-reported {word}");
                st.record_event(
                    EventKind::Pump,
                    format!("pump state reconciled to {word}"),
                );
            }
        }
        DecodedLine::Frame(_) => {
            // Sensor-shaped JSON on the pump link: firmware chatter, ignore.
            debug!("ignoring frame-shaped line on pump link");
            shared.write().await.pump_link.last_rx_ms = Some(now_ms());
        }
        DecodedLine::Empty => {}
        DecodedLine::Unrecognized => {
            debug!(line, "unrecognized pump line");
            shared.write().await.pump_link.last_rx_ms = Some(now_ms());
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SystemState;
    use crate::thresholds::Thresholds;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct Rig {
        handle: PumpHandle,
        shared: SharedState,
        device_rx: BufReader<tokio::io::ReadHalf<DuplexStream>>,
        device_tx: tokio::io::WriteHalf<DuplexStream>,
        _cancel: watch::Sender<bool>,
    }

    /// Spin up the pump task against an in-memory transport.
    fn rig() -> Rig {
        let (hub_side, device_side) = tokio::io::duplex(1024);
        let (hub_r, hub_w) = tokio::io::split(hub_side);
        let (dev_r, dev_w) = tokio::io::split(device_side);

        let shared = SystemState::shared(Thresholds::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = spawn(Box::new(hub_r), Box::new(hub_w), shared.clone(), cancel_rx);

        Rig {
            handle,
            shared,
            device_rx: BufReader::new(dev_r),
            device_tx: dev_w,
            _cancel: cancel_tx,
        }
    }

    async fn next_line(r: &mut Rig) -> String {
        let mut line = String::new();
        r.device_rx.read_line(&mut line).await.unwrap();
        line.trim().to_string()
    }

    async fn device_says(r: &mut Rig, line: &str) {
        r.device_tx
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    // -- Handshake ------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn off_is_sent_before_any_queued_command() {
        let mut r = rig();

        // Queue an ON before the handshake has a chance to finish.
        let handle = r.handle.clone();
        let on_task = tokio::spawn(async move { handle.set_pump(true).await });

        // First thing on the wire must be the safety OFF.
        assert_eq!(next_line(&mut r).await, "OFF");
        assert_eq!(next_line(&mut r).await, "ON");

        device_says(&mut r, "PUMP ON").await;
        assert_eq!(on_task.await.unwrap().unwrap(), CommandOutcome::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_resets_pump_state_and_marks_ready() {
        let mut r = rig();
        {
            // Pretend a previous session left intent dangling.
            let mut st = r.shared.write().await;
            st.pump.intended = true;
            st.pump.confirmed_by_device = true;
        }
        assert_eq!(next_line(&mut r).await, "OFF");
        // Give the task time to pass the post-OFF settle.
        tokio::time::sleep(Duration::from_millis(HANDSHAKE_SETTLE_MS + 100)).await;

        let st = r.shared.read().await;
        assert_eq!(st.pump_link.state, ConnectionState::Connected);
        assert_eq!(st.pump, PumpState::default());
    }

    // -- Two-phase commands ---------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn acknowledged_command_confirms_and_counts_irrigation() {
        let mut r = rig();
        assert_eq!(next_line(&mut r).await, "OFF");

        let handle = r.handle.clone();
        let on_task = tokio::spawn(async move { handle.set_pump(true).await });
        assert_eq!(next_line(&mut r).await, "ON");
        device_says(&mut r, "BOMBA ENCENDIDA").await;

        assert_eq!(on_task.await.unwrap().unwrap(), CommandOutcome::Confirmed);
        let st = r.shared.read().await;
        assert!(st.pump.intended);
        assert!(st.pump.confirmed_by_device);
        assert_eq!(st.counters.irrigation_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_command_times_out_but_keeps_intent() {
        let mut r = rig();
        assert_eq!(next_line(&mut r).await, "OFF");

        let handle = r.handle.clone();
        let on_task = tokio::spawn(async move { handle.set_pump(true).await });
        assert_eq!(next_line(&mut r).await, "ON");
        // Device stays silent; the bounded wait must resolve the caller.
        assert_eq!(on_task.await.unwrap().unwrap(), CommandOutcome::TimedOut);

        let st = r.shared.read().await;
        assert!(st.pump.intended, "optimistic intent survives the timeout");
        assert!(!st.pump.confirmed_by_device);
    }

    #[tokio::test(start_paused = true)]
    async fn turning_off_does_not_count_irrigation() {
        let mut r = rig();
        assert_eq!(next_line(&mut r).await, "OFF");

        let handle = r.handle.clone();
        let task = tokio::spawn(async move { handle.set_pump(false).await });
        assert_eq!(next_line(&mut r).await, "OFF");
        device_says(&mut r, "PUMP OFF").await;
        task.await.unwrap().unwrap();

        assert_eq!(r.shared.read().await.counters.irrigation_count, 0);
    }

    // -- Reconciliation -------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn device_report_overrides_local_intent_exactly_once() {
        let mut r = rig();
        assert_eq!(next_line(&mut r).await, "OFF");

        // Get to intended=true, confirmed=true.
        let handle = r.handle.clone();
        let task = tokio::spawn(async move { handle.set_pump(true).await });
        assert_eq!(next_line(&mut r).await, "ON");
        device_says(&mut r, "PUMP ON").await;
        task.await.unwrap().unwrap();

        // The device now reports OFF (e.g. a float switch killed the relay).
        device_says(&mut r, r#"{"pump_active": false}"#).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let st = r.shared.read().await;
            assert!(!st.pump.intended, "intent must follow the device");
            assert!(!st.pump.confirmed_by_device);
            let reconciles = st
                .events
                .iter()
                .filter(|e| e.detail.contains("reconciled"))
                .count();
            assert_eq!(reconciles, 1);
        }

        // A repeated identical report must not fire a second notification.
        device_says(&mut r, r#"{"pump_active": false}"#).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let st = r.shared.read().await;
        let reconciles = st
            .events
            .iter()
            .filter(|e| e.detail.contains("reconciled"))
            .count();
        assert_eq!(reconciles, 1);
    }

    // -- Auto mode & force off ------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn auto_mode_tokens_go_out_verbatim() {
        let mut r = rig();
        assert_eq!(next_line(&mut r).await, "OFF");

        let handle = r.handle.clone();
        tokio::spawn(async move {
            handle.set_auto_mode(true).await.unwrap();
        });
        assert_eq!(next_line(&mut r).await, "AUTO_MODE_ON");

        let handle = r.handle.clone();
        tokio::spawn(async move {
            handle.set_auto_mode(false).await.unwrap();
        });
        assert_eq!(next_line(&mut r).await, "AUTO_MODE_OFF");
    }

    #[tokio::test(start_paused = true)]
    async fn force_off_clears_intent_without_two_phase_wait() {
        let mut r = rig();
        assert_eq!(next_line(&mut r).await, "OFF");

        {
            r.shared.write().await.pump.intended = true;
        }
        let handle = r.handle.clone();
        let task = tokio::spawn(async move { handle.force_off().await });
        assert_eq!(next_line(&mut r).await, "OFF");
        task.await.unwrap().unwrap();

        assert!(!r.shared.read().await.pump.intended);
    }

    // -- Link teardown --------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn peer_close_marks_link_disconnected() {
        let mut r = rig();
        assert_eq!(next_line(&mut r).await, "OFF");
        tokio::time::sleep(Duration::from_millis(HANDSHAKE_SETTLE_MS + 100)).await;

        // Drop the device side entirely.
        drop(r.device_tx);
        drop(r.device_rx);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let st = r.shared.read().await;
        assert_eq!(st.pump_link.state, ConnectionState::Disconnected);
    }
}
