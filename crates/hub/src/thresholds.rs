//! Alert thresholds for the three configurable parameter sets.
//!
//! Updates go through validating setters that reject the whole set and
//! leave the current values untouched on any violation. Validation reports
//! every problem found, not just the first one.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Gas buckets, ascending: `0..=good` clean, `..=regular` moderate,
/// `..=bad` polluted, beyond that hazardous.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasThresholds {
    pub good: f64,
    pub regular: f64,
    pub bad: f64,
}

impl Default for GasThresholds {
    fn default() -> Self {
        Self {
            good: 30.0,
            regular: 100.0,
            bad: 150.0,
        }
    }
}

impl GasThresholds {
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        if self.good >= self.regular {
            errors.push(format!(
                "good ({}) must be below regular ({})",
                self.good, self.regular
            ));
        }
        if self.regular >= self.bad {
            errors.push(format!(
                "regular ({}) must be below bad ({})",
                self.regular, self.bad
            ));
        }
        reject_if_any("gas thresholds", errors)
    }
}

/// Tank level cut points in cm of distance to the water surface
/// (smaller distance = fuller tank), ascending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UltrasonicThresholds {
    pub min: f64,
    pub regular: f64,
    pub max: f64,
}

impl Default for UltrasonicThresholds {
    fn default() -> Self {
        Self {
            min: 5.0,
            regular: 15.0,
            max: 25.0,
        }
    }
}

impl UltrasonicThresholds {
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        if self.min >= self.regular {
            errors.push(format!(
                "min ({}) must be below regular ({})",
                self.min, self.regular
            ));
        }
        if self.regular >= self.max {
            errors.push(format!(
                "regular ({}) must be below max ({})",
                self.regular, self.max
            ));
        }
        reject_if_any("ultrasonic thresholds", errors)
    }
}

/// Per-plant targets: soil band plus temperature/humidity optima.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlantThresholds {
    pub soil_optimal: f64,
    pub soil_min: f64,
    pub soil_max: f64,
    pub temp_optimal: f64,
    pub humid_optimal: f64,
}

impl Default for PlantThresholds {
    fn default() -> Self {
        Self {
            soil_optimal: 50.0,
            soil_min: 25.0,
            soil_max: 75.0,
            temp_optimal: 25.0,
            humid_optimal: 60.0,
        }
    }
}

impl PlantThresholds {
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        if self.soil_min > self.soil_max {
            errors.push(format!(
                "soil_min ({}) must not exceed soil_max ({})",
                self.soil_min, self.soil_max
            ));
        }
        for (name, v) in [
            ("soil_optimal", self.soil_optimal),
            ("soil_min", self.soil_min),
            ("soil_max", self.soil_max),
            ("humid_optimal", self.humid_optimal),
        ] {
            if !(0.0..=100.0).contains(&v) {
                errors.push(format!("{name} ({v}) out of range [0, 100]"));
            }
        }
        reject_if_any("plant thresholds", errors)
    }
}

/// The full live threshold set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub gas: GasThresholds,
    #[serde(default)]
    pub ultrasonic: UltrasonicThresholds,
    #[serde(default)]
    pub plant: PlantThresholds,
}

impl Thresholds {
    pub fn update_gas(&mut self, new: GasThresholds) -> Result<()> {
        new.validate()?;
        self.gas = new;
        Ok(())
    }

    pub fn update_ultrasonic(&mut self, new: UltrasonicThresholds) -> Result<()> {
        new.validate()?;
        self.ultrasonic = new;
        Ok(())
    }

    pub fn update_plant(&mut self, new: PlantThresholds) -> Result<()> {
        new.validate()?;
        self.plant = new;
        Ok(())
    }
}

fn reject_if_any(what: &str, errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "invalid {what} ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
    }
}

// ===========================================================================
// Tests
// ===========================================================================
