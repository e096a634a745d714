//! Per-channel alert rate limiting.
//!
//! Sensor jitter near a threshold would otherwise raise the same alert on
//! every evaluation cycle. The gate lets one alert per channel through per
//! cooldown window; everything else is dropped silently.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;

use crate::evaluate::{Channel, Severity};

/// Minimum time between two notifications for the same channel.
pub const ALERT_COOLDOWN_MS: i64 = 5000;

/// Tracks the last time each channel was allowed to alert.
#[derive(Debug, Default)]
pub struct CooldownGate {
    last_alert_ms: HashMap<Channel, i64>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true and records the timestamp if the channel is outside its
    /// cooldown window; otherwise the alert is suppressed.
    pub fn allow(&mut self, channel: Channel, now_ms: i64) -> bool {
        match self.last_alert_ms.get(&channel) {
            Some(&last) if now_ms - last < ALERT_COOLDOWN_MS => false,
            _ => {
                self.last_alert_ms.insert(channel, now_ms);
                true
            }
        }
    }

    pub fn clear(&mut self) {
        self.last_alert_ms.clear();
    }
}

/// One delivered notification, as kept in the bounded alert history.
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub channel: Option<Channel>,
    pub severity: Severity,
    pub message: String,
}

// ===========================================================================
// Tests
// ===========================================================================
