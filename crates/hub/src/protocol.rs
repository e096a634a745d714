//! Wire protocol for both Arduino links.
//!
//! Inbound: newline-delimited UTF-8 lines, either a JSON sensor frame, a
//! pump acknowledgment (JSON `pump_active` or one of several known text
//! phrases), or noise. One decoder classifies every line into a tagged
//! result; nothing here ever fails the stream — a garbled line decodes to
//! [`DecodedLine::Unrecognized`] and life goes on.
//!
//! Outbound (pump only): single-token commands terminated by `\n`.

use serde::Serialize;
use serde_json::Value;

/// One decoded sensor sample. Missing or unparsable fields default to 0
/// independently; a single bad field never spoils the rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorFrame {
    pub gas: f64,
    pub ultrasonic: f64,
    pub soil: f64,
    pub temperature: f64,
    pub humidity: f64,
}

/// Classification of one inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedLine {
    /// Valid JSON sensor frame.
    Frame(SensorFrame),
    /// Pump state confirmation. `structured` marks the unambiguous JSON
    /// form, which outranks text phrases for reconciliation.
    PumpAck { active: bool, structured: bool },
    /// Blank line — framing artifact, dropped without logging.
    Empty,
    /// Anything else. Logged at debug by callers, never an error.
    Unrecognized,
}

/// Commands the hub may send to the pump Arduino.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpWireCommand {
    On,
    Off,
    AutoModeOn,
    AutoModeOff,
}

impl PumpWireCommand {
    pub fn token(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::AutoModeOn => "AUTO_MODE_ON",
            Self::AutoModeOff => "AUTO_MODE_OFF",
        }
    }
}

/// Text fragments the pump firmware has been observed to print when the
/// relay actually switches. Multiple variants per polarity so a firmware
/// wording tweak doesn't silently break reconciliation.
const ACK_ON_VARIANTS: &[&str] = &["PUMP ON", "PUMP IS ON", "BOMBA ENCENDIDA", "✅"];
const ACK_OFF_VARIANTS: &[&str] = &["PUMP OFF", "PUMP IS OFF", "BOMBA APAGADA", "🛑"];

/// Classify one line (not yet trimmed).
pub fn decode_line(line: &str) -> DecodedLine {
    let line = line.trim();
    if line.is_empty() {
        return DecodedLine::Empty;
    }

    if line.starts_with('{') {
        let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(line) else {
            return DecodedLine::Unrecognized;
        };
        // The explicit pump status field is unambiguous and takes
        // precedence over frame interpretation.
        if let Some(Value::Bool(active)) = obj.get("pump_active") {
            return DecodedLine::PumpAck {
                active: *active,
                structured: true,
            };
        }
        return DecodedLine::Frame(SensorFrame {
            gas: coerce(obj.get("gas")),
            ultrasonic: coerce(obj.get("ultrasonic")),
            soil: coerce(obj.get("soil")),
            temperature: coerce(obj.get("temperature")),
            humidity: coerce(obj.get("humidity")),
        });
    }

    if ACK_ON_VARIANTS.iter().any(|v| line.contains(v)) {
        return DecodedLine::PumpAck {
            active: true,
            structured: false,
        };
    }
    if ACK_OFF_VARIANTS.iter().any(|v| line.contains(v)) {
        return DecodedLine::PumpAck {
            active: false,
            structured: false,
        };
    }

    DecodedLine::Unrecognized
}

/// Field-wise numeric coercion: numbers pass through, numeric strings parse,
/// everything else (including NaN/inf) collapses to 0.
fn coerce(v: Option<&Value>) -> f64 {
    let n = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

// ===========================================================================
// Tests
// ===========================================================================
