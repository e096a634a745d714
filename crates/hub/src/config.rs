//! TOML config file loading and validation.
//!
//! The file seeds device endpoints and first-run threshold defaults; a
//! persisted state snapshot, when present, wins over the threshold defaults
//! at boot. Validation reports every violation found, not just the first.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::thresholds::Thresholds;
use crate::transport::Endpoint;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub devices: Devices,
    #[serde(default)]
    pub web: Web,
    #[serde(default)]
    pub persistence: Persistence,
    #[serde(default)]
    pub thresholds: Thresholds,
}

#[derive(Debug, Deserialize)]
pub struct Devices {
    /// Sensor Arduino: serial path or `tcp:host:port`. Empty = not wired up.
    #[serde(default)]
    pub sensor_endpoint: String,
    /// Pump Arduino: serial path or `tcp:host:port`. Empty = not wired up.
    #[serde(default)]
    pub pump_endpoint: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for Devices {
    fn default() -> Self {
        Self {
            sensor_endpoint: String::new(),
            pump_endpoint: String::new(),
            baud: default_baud(),
        }
    }
}

fn default_baud() -> u32 {
    9600
}

#[derive(Debug, Deserialize)]
pub struct Web {
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for Web {
    fn default() -> Self {
        Self {
            port: default_web_port(),
        }
    }
}

fn default_web_port() -> u16 {
    8080
}

#[derive(Debug, Deserialize)]
pub struct Persistence {
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// How often the state snapshot is written, in seconds.
    #[serde(default = "default_snapshot_secs")]
    pub snapshot_every_secs: u64,
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            db_url: default_db_url(),
            snapshot_every_secs: default_snapshot_secs(),
        }
    }
}

fn default_db_url() -> String {
    "sqlite:rig.db?mode=rwc".to_string()
}

fn default_snapshot_secs() -> u64 {
    300
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate the whole file. Returns `Ok(())` or an error describing
    /// every violation found.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.devices.baud == 0 {
            errors.push("devices.baud must be positive".to_string());
        }
        for (name, spec) in [
            ("sensor_endpoint", &self.devices.sensor_endpoint),
            ("pump_endpoint", &self.devices.pump_endpoint),
        ] {
            if !spec.trim().is_empty() {
                if let Err(e) = Endpoint::parse(spec, self.devices.baud.max(1)) {
                    errors.push(format!("devices.{name}: {e}"));
                }
            }
        }

        if self.persistence.snapshot_every_secs == 0 {
            errors.push("persistence.snapshot_every_secs must be positive".to_string());
        }

        for (name, res) in [
            ("thresholds.gas", self.thresholds.gas.validate()),
            ("thresholds.ultrasonic", self.thresholds.ultrasonic.validate()),
            ("thresholds.plant", self.thresholds.plant.validate()),
        ] {
            if let Err(e) = res {
                errors.push(format!("{name}: {e:#}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing --------------------------------------------------------------

    #[test]
    fn parse_empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.devices.baud, 9600);
        assert_eq!(cfg.web.port, 8080);
        assert_eq!(cfg.persistence.snapshot_every_secs, 300);
        assert_eq!(cfg.thresholds.gas.good, 30.0);
        cfg.validate().unwrap();
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[devices]
sensor_endpoint = "tcp:127.0.0.1:7001"
pump_endpoint = "/dev/ttyUSB1"
baud = 115200

[web]
port = 9090

[persistence]
db_url = "sqlite::memory:"
snapshot_every_secs = 60

[thresholds.gas]
good = 25.0
regular = 90.0
bad = 140.0

[thresholds.ultrasonic]
min = 4.0
regular = 12.0
max = 22.0

[thresholds.plant]
soil_optimal = 55.0
soil_min = 30.0
soil_max = 70.0
temp_optimal = 22.0
humid_optimal = 65.0
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.devices.sensor_endpoint, "tcp:127.0.0.1:7001");
        assert_eq!(cfg.devices.baud, 115200);
        assert_eq!(cfg.web.port, 9090);
        assert_eq!(cfg.thresholds.plant.soil_min, 30.0);
    }

    // -- Validation -----------------------------------------------------------

    #[test]
    fn zero_baud_rejected() {
        let cfg: Config = toml::from_str("[devices]\nbaud = 0\n").unwrap();
        assert_validation_err(&cfg, "baud must be positive");
    }

    #[test]
    fn bad_tcp_endpoint_rejected() {
        let cfg: Config =
            toml::from_str("[devices]\nsensor_endpoint = \"tcp:\"\n").unwrap();
        assert_validation_err(&cfg, "sensor_endpoint");
    }

    #[test]
    fn empty_endpoints_are_allowed() {
        let cfg: Config = toml::from_str("").unwrap();
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_snapshot_interval_rejected() {
        let cfg: Config =
            toml::from_str("[persistence]\nsnapshot_every_secs = 0\n").unwrap();
        assert_validation_err(&cfg, "snapshot_every_secs");
    }

    #[test]
    fn unordered_gas_thresholds_rejected() {
        let cfg: Config = toml::from_str(
            "[thresholds.gas]\ngood = 100.0\nregular = 50.0\nbad = 150.0\n",
        )
        .unwrap();
        assert_validation_err(&cfg, "thresholds.gas");
    }

    #[test]
    fn unordered_ultrasonic_thresholds_rejected() {
        let cfg: Config = toml::from_str(
            "[thresholds.ultrasonic]\nmin = 20.0\nregular = 10.0\nmax = 25.0\n",
        )
        .unwrap();
        assert_validation_err(&cfg, "thresholds.ultrasonic");
    }

    #[test]
    fn multiple_errors_collected() {
        let cfg: Config = toml::from_str(
            r#"
[devices]
baud = 0
sensor_endpoint = "tcp:"

[persistence]
snapshot_every_secs = 0
"#,
        )
        .unwrap();
        let msg = format!("{:#}", cfg.validate().unwrap_err());
        assert!(msg.contains("baud"), "missing baud error: {msg}");
        assert!(msg.contains("sensor_endpoint"), "missing endpoint error: {msg}");
        assert!(
            msg.contains("snapshot_every_secs"),
            "missing snapshot error: {msg}"
        );
    }
}
