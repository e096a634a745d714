//! Auto-irrigation policy: bang-bang over the stable soil reading.
//!
//! The dead band between `soil_min` and `soil_max` is what keeps the pump
//! from chattering; there is no proportional response. The policy only
//! produces an action — actuation always goes through the pump link, which
//! owns the state transitions.

use serde::{Deserialize, Serialize};

use crate::thresholds::PlantThresholds;

/// Whether the hub is allowed to drive the pump on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Manual,
    Auto,
}

impl Default for OperationMode {
    fn default() -> Self {
        OperationMode::Manual
    }
}

/// Requested pump transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpAction {
    TurnOn,
    TurnOff,
}

/// Decide whether the soil reading warrants a pump transition.
///
/// Returns `None` outside auto mode, under emergency stop, or while the
/// reading sits inside the dead band.
pub fn check_auto_irrigation(
    soil: f64,
    plant: &PlantThresholds,
    pump_on: bool,
    mode: OperationMode,
    emergency_stop: bool,
) -> Option<PumpAction> {
    if mode != OperationMode::Auto || emergency_stop {
        return None;
    }
    if soil < plant.soil_min && !pump_on {
        Some(PumpAction::TurnOn)
    } else if soil > plant.soil_max && pump_on {
        Some(PumpAction::TurnOff)
    } else {
        None
    }
}

// ===========================================================================
// Tests
// ===========================================================================
