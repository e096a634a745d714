//! Process-wide mutable state behind one `RwLock`.
//!
//! Everything the pipeline mutates — stable reading, thresholds, pump
//! state, counters, bounded rings — lives in [`SystemState`] and is passed
//! around explicitly. All mutation happens through short synchronous
//! critical sections on the tokio runtime; no lock is ever held across an
//! await.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::alerts::{AlertRecord, CooldownGate};
use crate::controller::OperationMode;
use crate::evaluate::{Channel, Level, Severity};
use crate::protocol::SensorFrame;
use crate::stabilizer::StableReading;
use crate::thresholds::Thresholds;

/// Stable readings kept for the dashboard chart.
const MAX_HISTORY: usize = 20;
/// Delivered notifications kept for the alert panel.
const MAX_ALERTS: usize = 50;
/// System events kept in the ring buffer.
const MAX_EVENTS: usize = 200;

pub type SharedState = Arc<RwLock<SystemState>>;

/// Wall clock in unix milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Lifecycle of one device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

/// Per-device link status. `last_rx_ms` is advisory staleness only — a
/// silent device produces no data and no error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub last_rx_ms: Option<i64>,
    pub detail: Option<String>,
}

/// Local pump intent vs device-reported truth. The two may transiently
/// diverge; reconciliation forces `intended` to follow the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PumpState {
    pub intended: bool,
    pub confirmed_by_device: bool,
}

/// Monotonic counters, reset only by the explicit clear-data action.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SystemCounters {
    pub total_readings: u64,
    pub alert_count: u64,
    pub irrigation_count: u64,
}

/// Running count of evaluations per level, for the summary chart.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LevelTally {
    pub good: u64,
    pub regular: u64,
    pub bad: u64,
    pub critical: u64,
}

impl LevelTally {
    pub fn bump(&mut self, level: Level) {
        match level {
            Level::Normal => self.good += 1,
            Level::Warning => self.regular += 1,
            Level::Danger => self.bad += 1,
            Level::Critical => self.critical += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    #[serde(flatten)]
    pub frame: SensorFrame,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Reading,
    Pump,
    Alert,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// Snapshot (persisted between runs)
// ---------------------------------------------------------------------------

/// The durable slice of the state. Emergency stop is deliberately absent —
/// a restart must never come up stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub thresholds: Thresholds,
    pub counters: SystemCounters,
    pub tally: LevelTally,
    pub mode: OperationMode,
}

// ---------------------------------------------------------------------------
// SystemState
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub sensor_link: LinkStatus,
    pub pump_link: LinkStatus,
    pub stable: StableReading,
    pub thresholds: Thresholds,
    pub pump: PumpState,
    pub mode: OperationMode,
    pub emergency_stop: bool,
    pub counters: SystemCounters,
    pub tally: LevelTally,
    pub history: VecDeque<HistoryEntry>,
    pub alerts: VecDeque<AlertRecord>,
    pub events: VecDeque<SystemEvent>,
    pub cooldown: CooldownGate,
}

impl SystemState {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            started_at: Instant::now(),
            sensor_link: LinkStatus::default(),
            pump_link: LinkStatus::default(),
            stable: StableReading::default(),
            thresholds,
            pump: PumpState::default(),
            mode: OperationMode::Manual,
            emergency_stop: false,
            counters: SystemCounters::default(),
            tally: LevelTally::default(),
            history: VecDeque::with_capacity(MAX_HISTORY),
            alerts: VecDeque::with_capacity(MAX_ALERTS),
            events: VecDeque::with_capacity(MAX_EVENTS),
            cooldown: CooldownGate::new(),
        }
    }

    pub fn shared(thresholds: Thresholds) -> SharedState {
        Arc::new(RwLock::new(Self::new(thresholds)))
    }

    // -- Mutation -----------------------------------------------------------

    /// Append an accepted stable reading to the history ring.
    pub fn push_history(&mut self, frame: SensorFrame) {
        if self.history.len() >= MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry {
            ts: OffsetDateTime::now_utc(),
            frame,
        });
    }

    /// Deliver a notification, honoring the per-channel cooldown when a
    /// channel is given. Returns whether the notification went out.
    pub fn notify(
        &mut self,
        channel: Option<Channel>,
        severity: Severity,
        message: String,
        now_ms: i64,
    ) -> bool {
        if let Some(ch) = channel {
            if !self.cooldown.allow(ch, now_ms) {
                return false;
            }
        }

        if severity.is_informational() {
            info!(?channel, "{message}");
        } else {
            warn!(?channel, "{message}");
            self.counters.alert_count += 1;
        }

        if self.alerts.len() >= MAX_ALERTS {
            self.alerts.pop_front();
        }
        self.alerts.push_back(AlertRecord {
            ts: OffsetDateTime::now_utc(),
            channel,
            severity,
            message: message.clone(),
        });
        self.record_event(EventKind::Alert, message);
        true
    }

    pub fn record_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }

    /// Wipe counters, tallies, history and alert state. Thresholds and
    /// connections survive.
    pub fn clear_data(&mut self) {
        self.counters = SystemCounters::default();
        self.tally = LevelTally::default();
        self.history.clear();
        self.alerts.clear();
        self.cooldown.clear();
        self.record_event(EventKind::System, "data cleared".to_string());
    }

    // -- Snapshot / restore -------------------------------------------------

    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            thresholds: self.thresholds,
            counters: self.counters,
            tally: self.tally,
            mode: self.mode,
        }
    }

    pub fn restore(&mut self, saved: PersistedState) {
        self.thresholds = saved.thresholds;
        self.counters = saved.counters;
        self.tally = saved.tally;
        self.mode = saved.mode;
        self.emergency_stop = false;
    }

    // -- Status -------------------------------------------------------------

    pub fn uptime(&self) -> String {
        let secs = self.started_at.elapsed().as_secs();
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SystemState {
        SystemState::new(Thresholds::default())
    }

    // -- Notifications ------------------------------------------------------

    #[test]
    fn channel_alert_respects_cooldown() {
        let mut st = state();
        assert!(st.notify(Some(Channel::Soil), Severity::Warning, "dry".into(), 1_000));
        assert!(!st.notify(Some(Channel::Soil), Severity::Warning, "dry".into(), 2_000));
        assert_eq!(st.alerts.len(), 1);
    }

    #[test]
    fn channelless_notifications_bypass_cooldown() {
        let mut st = state();
        assert!(st.notify(None, Severity::Info, "hub started".into(), 1_000));
        assert!(st.notify(None, Severity::Info, "pump connected".into(), 1_001));
        assert_eq!(st.alerts.len(), 2);
    }

    #[test]
    fn only_non_informational_alerts_count() {
        let mut st = state();
        st.notify(None, Severity::Success, "ok".into(), 1_000);
        st.notify(None, Severity::Info, "fyi".into(), 1_001);
        assert_eq!(st.counters.alert_count, 0);
        st.notify(None, Severity::Warning, "hm".into(), 1_002);
        st.notify(None, Severity::Danger, "bad".into(), 1_003);
        assert_eq!(st.counters.alert_count, 2);
    }

    #[test]
    fn alert_ring_is_bounded() {
        let mut st = state();
        for i in 0..60 {
            st.notify(None, Severity::Info, format!("n{i}"), i);
        }
        assert_eq!(st.alerts.len(), MAX_ALERTS);
        assert_eq!(st.alerts.front().unwrap().message, "n10");
    }

    // -- History ------------------------------------------------------------

    #[test]
    fn history_ring_is_bounded() {
        let mut st = state();
        for i in 0..25 {
            st.push_history(SensorFrame {
                gas: i as f64,
                ultrasonic: 0.0,
                soil: 0.0,
                temperature: 0.0,
                humidity: 0.0,
            });
        }
        assert_eq!(st.history.len(), MAX_HISTORY);
        assert_eq!(st.history.front().unwrap().frame.gas, 5.0);
    }

    // -- Clear data ----------------------------------------------------------

    #[test]
    fn clear_data_resets_counters_but_keeps_thresholds() {
        let mut st = state();
        st.counters.total_readings = 42;
        st.counters.irrigation_count = 3;
        st.tally.good = 10;
        st.push_history(SensorFrame {
            gas: 1.0,
            ultrasonic: 1.0,
            soil: 1.0,
            temperature: 1.0,
            humidity: 1.0,
        });
        let thresholds_before = st.thresholds;

        st.clear_data();

        assert_eq!(st.counters.total_readings, 0);
        assert_eq!(st.counters.irrigation_count, 0);
        assert_eq!(st.tally.good, 0);
        assert!(st.history.is_empty());
        assert_eq!(st.thresholds, thresholds_before);
    }

    #[test]
    fn clear_data_reopens_alert_cooldowns() {
        let mut st = state();
        assert!(st.notify(Some(Channel::Soil), Severity::Warning, "dry".into(), 1_000));
        st.clear_data();
        assert!(st.notify(Some(Channel::Soil), Severity::Warning, "dry".into(), 1_001));
    }

    // -- Snapshot / restore --------------------------------------------------

    #[test]
    fn snapshot_round_trips() {
        let mut st = state();
        st.counters.total_readings = 7;
        st.mode = OperationMode::Auto;
        st.tally.regular = 4;

        let saved = st.snapshot();
        let mut fresh = state();
        fresh.restore(saved);

        assert_eq!(fresh.counters.total_readings, 7);
        assert_eq!(fresh.mode, OperationMode::Auto);
        assert_eq!(fresh.tally.regular, 4);
    }

    #[test]
    fn restore_never_comes_up_emergency_stopped() {
        let mut st = state();
        st.emergency_stop = true;
        let saved = st.snapshot();

        let mut fresh = state();
        fresh.emergency_stop = true;
        fresh.restore(saved);
        assert!(!fresh.emergency_stop);
    }

    #[test]
    fn snapshot_serializes_to_json_and_back() {
        let st = state();
        let json = serde_json::to_string(&st.snapshot()).unwrap();
        let back: PersistedState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mode, OperationMode::Manual);
    }
}
