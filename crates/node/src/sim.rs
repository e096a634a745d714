//! Stateful five-channel rig simulator for local development.
//!
//! Models the behaviour of the cheap sensors on the real rig:
//! - Temporal coherence via random walk with mean reversion
//! - Gradual soil drying drift (evaporation)
//! - Per-reading electronic noise
//! - Occasional spikes (sensor flakiness)
//! - Closed-loop watering response (soil rises and the tank drains while
//!   the pump runs)

use std::fmt;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `SIM_SCENARIO` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Soil drifts toward dry. Moderate noise. Exercises auto irrigation.
    Drying,
    /// Everything hovers near healthy targets. Low noise, rare spikes.
    Stable,
    /// High noise and ~10% spike rate. Tests the hub's hysteresis filter
    /// and alert cooldowns.
    Flaky,
    /// Starts wet and stays wet. The controller should do nothing.
    Wet,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "flaky" => Self::Flaky,
            "wet" => Self::Wet,
            _ => Self::Drying, // default
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drying => write!(f, "drying"),
            Self::Stable => write!(f, "stable"),
            Self::Flaky => write!(f, "flaky"),
            Self::Wet => write!(f, "wet"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-channel state
// ---------------------------------------------------------------------------

struct ChannelState {
    /// Current "true" value. Evolves each tick.
    value: f64,
    /// Mean-reversion target.
    center: f64,
    min: f64,
    max: f64,
    walk_sigma: f64,
    noise_sigma: f64,
    mean_reversion: f64,
    /// Constant per-tick drift (soil evaporation, tank refill, ...).
    drift: f64,
}

impl ChannelState {
    fn new(start: f64, center: f64, min: f64, max: f64, walk: f64, noise: f64) -> Self {
        Self {
            value: start,
            center,
            min,
            max,
            walk_sigma: walk,
            noise_sigma: noise,
            mean_reversion: 0.03,
            drift: 0.0,
        }
    }

    fn step(&mut self, extra_drift: f64, spike: f64) -> f64 {
        let pull = self.mean_reversion * (self.center - self.value);
        let walk = gaussian(0.0, self.walk_sigma);
        self.value = (self.value + self.drift + extra_drift + pull + walk)
            .clamp(self.min, self.max);

        let reading = self.value + gaussian(0.0, self.noise_sigma) + spike;
        reading.clamp(self.min, self.max)
    }
}

// ---------------------------------------------------------------------------
// One sampled frame
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SimFrame {
    pub gas: f64,
    pub ultrasonic: f64,
    pub soil: f64,
    pub temperature: f64,
    pub humidity: f64,
}

// ---------------------------------------------------------------------------
// Main simulator
// ---------------------------------------------------------------------------

/// Stateful simulator producing realistic rig frames.
pub struct GardenSim {
    gas: ChannelState,
    ultrasonic: ChannelState,
    soil: ChannelState,
    temperature: ChannelState,
    humidity: ChannelState,

    spike_prob: f32,
    spike_sigma: f64,

    watering: bool,
    /// Soil percentage gained per tick while the pump runs.
    wet_rate: f64,
    /// Tank distance gained per tick while the pump runs (draining).
    drain_rate: f64,
}

impl GardenSim {
    pub fn new(scenario: Scenario) -> Self {
        let (soil_start, soil_drift, walk_scale, noise_scale, spike_prob, spike_sigma) =
            match scenario {
                Scenario::Drying => (45.0, -0.08, 1.0, 1.0, 0.03_f32, 12.0),
                Scenario::Stable => (50.0, 0.0, 0.5, 0.5, 0.005, 6.0),
                Scenario::Flaky => (45.0, -0.05, 1.8, 2.5, 0.10, 20.0),
                Scenario::Wet => (78.0, -0.01, 0.6, 0.6, 0.02, 8.0),
            };

        let mut soil = ChannelState::new(
            soil_start,
            soil_start,
            0.0,
            100.0,
            0.6 * walk_scale,
            0.8 * noise_scale,
        );
        soil.drift = soil_drift;
        // Drying soil should not be pulled back up by mean reversion.
        soil.mean_reversion = 0.0;

        Self {
            gas: ChannelState::new(22.0, 22.0, 0.0, 500.0, 1.2 * walk_scale, 1.0 * noise_scale),
            ultrasonic: ChannelState::new(
                16.0,
                16.0,
                1.0,
                40.0,
                0.3 * walk_scale,
                0.4 * noise_scale,
            ),
            soil,
            temperature: ChannelState::new(
                24.0,
                24.0,
                5.0,
                45.0,
                0.15 * walk_scale,
                0.2 * noise_scale,
            ),
            humidity: ChannelState::new(
                60.0,
                60.0,
                5.0,
                100.0,
                0.8 * walk_scale,
                0.6 * noise_scale,
            ),
            spike_prob,
            spike_sigma,
            watering: false,
            wet_rate: 0.9,
            drain_rate: 0.25,
        }
    }

    /// Inform the simulator whether the pump is currently running.
    pub fn set_watering(&mut self, active: bool) {
        self.watering = active;
    }

    pub fn watering(&self) -> bool {
        self.watering
    }

    fn spike(&self) -> f64 {
        if fastrand::f32() < self.spike_prob {
            gaussian(0.0, self.spike_sigma)
        } else {
            0.0
        }
    }

    /// Produce the next frame. The internal state evolves with each call,
    /// so call frequency matters.
    pub fn sample(&mut self) -> SimFrame {
        let (soil_extra, tank_extra) = if self.watering {
            (self.wet_rate, self.drain_rate)
        } else {
            (0.0, 0.0)
        };

        SimFrame {
            gas: round1(self.gas.step(0.0, self.spike())),
            ultrasonic: round1(self.ultrasonic.step(tank_extra, self.spike() * 0.2)),
            soil: round1(self.soil.step(soil_extra, self.spike() * 0.3)),
            temperature: round1(self.temperature.step(0.0, self.spike() * 0.1)),
            humidity: round1(self.humidity.step(0.0, self.spike() * 0.2)),
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ===========================================================================
// Tests
// ===========================================================================
