//! Debounce/hysteresis gate between the raw frame stream and the stable
//! reading everything else consumes.
//!
//! The rig emits frames far faster than anyone needs to see them, and the
//! cheap sensors jitter. A new frame replaces the stable reading only when
//! the timed interval has elapsed or some channel moved more than its
//! significance delta. The replacement value is the raw frame itself — this
//! is an edge-triggered filter, not a smoother.

use serde::{Deserialize, Serialize};

use crate::protocol::SensorFrame;

/// Minimum time between timed replacements.
pub const UPDATE_INTERVAL_MS: i64 = 2000;

/// Per-channel minimum change that forces an immediate replacement.
/// Channels differ because their noise floors and units differ.
#[derive(Debug, Clone, Copy)]
pub struct SignificanceDeltas {
    pub gas: f64,
    pub ultrasonic: f64,
    pub soil: f64,
    pub temperature: f64,
    pub humidity: f64,
}

impl Default for SignificanceDeltas {
    fn default() -> Self {
        Self {
            gas: 5.0,
            ultrasonic: 2.0,
            soil: 3.0,
            temperature: 1.0,
            humidity: 3.0,
        }
    }
}

/// The authoritative current sensor state. All five channels are replaced
/// together so a single evaluation cycle always sees one coherent sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StableReading {
    pub gas: f64,
    pub ultrasonic: f64,
    pub soil: f64,
    pub temperature: f64,
    pub humidity: f64,
    /// Unix ms of the last replacement; 0 until the first frame lands.
    pub last_update_ms: i64,
}

impl StableReading {
    pub fn as_frame(&self) -> SensorFrame {
        SensorFrame {
            gas: self.gas,
            ultrasonic: self.ultrasonic,
            soil: self.soil,
            temperature: self.temperature,
            humidity: self.humidity,
        }
    }
}

/// What to do with an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Replace the stable reading and run the downstream chain.
    Replace,
    /// Nothing moved enough; keep the current stable reading.
    Skip,
}

#[derive(Debug, Default)]
pub struct Stabilizer {
    deltas: SignificanceDeltas,
}

impl Stabilizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_deltas(deltas: SignificanceDeltas) -> Self {
        Self { deltas }
    }

    /// Decide whether `frame` should replace `current` at `now_ms`.
    pub fn decide(&self, current: &StableReading, frame: &SensorFrame, now_ms: i64) -> Decision {
        if now_ms - current.last_update_ms > UPDATE_INTERVAL_MS {
            return Decision::Replace;
        }
        let d = &self.deltas;
        let significant = (frame.gas - current.gas).abs() > d.gas
            || (frame.ultrasonic - current.ultrasonic).abs() > d.ultrasonic
            || (frame.soil - current.soil).abs() > d.soil
            || (frame.temperature - current.temperature).abs() > d.temperature
            || (frame.humidity - current.humidity).abs() > d.humidity;
        if significant {
            Decision::Replace
        } else {
            Decision::Skip
        }
    }

    /// Overwrite all five channels atomically.
    pub fn apply(&self, current: &mut StableReading, frame: &SensorFrame, now_ms: i64) {
        current.gas = frame.gas;
        current.ultrasonic = frame.ultrasonic;
        current.soil = frame.soil;
        current.temperature = frame.temperature;
        current.humidity = frame.humidity;
        current.last_update_ms = now_ms;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
