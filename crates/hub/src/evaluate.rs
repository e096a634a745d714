//! Per-channel evaluation of the stable reading against the live thresholds.
//!
//! Five pure functions, one per sensor channel, each with its own threshold
//! shape. A reading of exactly 0 means "sensor absent" for every channel
//! except gas, where 0 falls through the ascending buckets into the clean
//! bucket — the MQ sensor genuinely reads near 0 in clean air, so it gets
//! no special case.
//!
//! Level drives the dashboard card color; the message/icon carry the
//! sentiment. The two are deliberately decoupled (a full tank reports the
//! warning-colored bucket with a favorable message).

use serde::Serialize;

use crate::thresholds::{GasThresholds, PlantThresholds, UltrasonicThresholds};

/// Qualitative level for a channel, also the dashboard card color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Normal,
    Warning,
    Danger,
    Critical,
}

/// Notification severity, mirroring the dashboard toast styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

impl Severity {
    /// Only warnings and dangers count toward the alert counter.
    pub fn is_informational(self) -> bool {
        matches!(self, Severity::Info | Severity::Success)
    }
}

/// The five sensor channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Gas,
    Ultrasonic,
    Soil,
    Temperature,
    Humidity,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Gas,
        Channel::Ultrasonic,
        Channel::Soil,
        Channel::Temperature,
        Channel::Humidity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Gas => "gas",
            Channel::Ultrasonic => "ultrasonic",
            Channel::Soil => "soil",
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
        }
    }

    /// Human name used when composing alert messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Channel::Gas => "Gas",
            Channel::Ultrasonic => "Tank level",
            Channel::Soil => "Soil moisture",
            Channel::Temperature => "Temperature",
            Channel::Humidity => "Air humidity",
        }
    }
}

/// Outcome of evaluating one channel. Stateless; recomputed per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelEvaluation {
    pub level: Level,
    pub message: &'static str,
    pub icon: &'static str,
    pub should_alert: bool,
    pub alert_severity: Severity,
}

impl ChannelEvaluation {
    fn quiet(level: Level, message: &'static str, icon: &'static str) -> Self {
        Self {
            level,
            message,
            icon,
            should_alert: false,
            alert_severity: Severity::Info,
        }
    }

    fn alerting(
        level: Level,
        message: &'static str,
        icon: &'static str,
        severity: Severity,
    ) -> Self {
        Self {
            level,
            message,
            icon,
            should_alert: true,
            alert_severity: severity,
        }
    }
}

/// Ascending bucket comparison against the three gas cut points.
pub fn evaluate_gas(value: f64, t: &GasThresholds) -> ChannelEvaluation {
    if value <= t.good {
        ChannelEvaluation::quiet(Level::Normal, "Clean air", "🟢")
    } else if value <= t.regular {
        ChannelEvaluation::quiet(Level::Warning, "Moderate air quality", "🟡")
    } else if value <= t.bad {
        ChannelEvaluation::quiet(Level::Danger, "Polluted air", "🟠")
    } else {
        ChannelEvaluation::quiet(Level::Critical, "Hazardous air!", "🔴")
    }
}

/// Inverted bucket comparison: the sensor measures distance down to the
/// water surface, so smaller is fuller.
pub fn evaluate_ultrasonic(value: f64, t: &UltrasonicThresholds) -> ChannelEvaluation {
    if value <= 0.0 {
        ChannelEvaluation::quiet(Level::Normal, "No sensor data", "❌")
    } else if value <= t.min {
        ChannelEvaluation::quiet(Level::Danger, "Overflow!", "🔴")
    } else if value <= t.regular {
        ChannelEvaluation::quiet(Level::Warning, "Tank full", "🟢")
    } else if value <= t.max {
        ChannelEvaluation::quiet(Level::Normal, "Normal level", "🟡")
    } else {
        ChannelEvaluation::quiet(Level::Critical, "Tank empty", "⚠️")
    }
}

/// Band comparison against the configured soil range, with a critical
/// dryness cutoff at 70 % of the minimum.
pub fn evaluate_soil(value: f64, t: &PlantThresholds) -> ChannelEvaluation {
    if value == 0.0 {
        return ChannelEvaluation::quiet(Level::Normal, "No sensor data", "");
    }
    if value >= t.soil_min && value <= t.soil_max {
        ChannelEvaluation::quiet(Level::Normal, "Optimal moisture", "")
    } else if value < t.soil_min {
        if value < t.soil_min * 0.7 {
            ChannelEvaluation::alerting(
                Level::Danger,
                "Critically dry - water now!",
                "",
                Severity::Danger,
            )
        } else {
            ChannelEvaluation::alerting(
                Level::Warning,
                "Dry soil - needs watering",
                "",
                Severity::Warning,
            )
        }
    } else {
        ChannelEvaluation::alerting(
            Level::Warning,
            "Waterlogged - reduce watering",
            "",
            Severity::Warning,
        )
    }
}

/// Symmetric bands around the optimal temperature: within 3 °C optimal,
/// within 7 °C moderate, beyond 15 °C extreme.
pub fn evaluate_temperature(value: f64, t: &PlantThresholds) -> ChannelEvaluation {
    if value == 0.0 {
        return ChannelEvaluation::quiet(Level::Normal, "No data", "");
    }
    let diff = (value - t.temp_optimal).abs();
    if diff < 3.0 {
        ChannelEvaluation::quiet(Level::Normal, "Optimal temperature", "")
    } else if diff < 7.0 {
        ChannelEvaluation::quiet(Level::Warning, "Mild deviation", "")
    } else if diff > 15.0 {
        ChannelEvaluation::alerting(
            Level::Danger,
            "Extreme temperature - check!",
            "",
            Severity::Warning,
        )
    } else {
        ChannelEvaluation::quiet(Level::Warning, "Temperature off target", "")
    }
}

/// Symmetric bands around the optimal air humidity: within 10 % ideal,
/// within 20 % acceptable, beyond 30 % extreme.
pub fn evaluate_humidity(value: f64, t: &PlantThresholds) -> ChannelEvaluation {
    if value == 0.0 {
        return ChannelEvaluation::quiet(Level::Normal, "No data", "");
    }
    let diff = (value - t.humid_optimal).abs();
    if diff < 10.0 {
        ChannelEvaluation::quiet(Level::Normal, "Humidity ideal", "")
    } else if diff < 20.0 {
        ChannelEvaluation::quiet(Level::Warning, "Humidity acceptable", "")
    } else if diff > 30.0 {
        ChannelEvaluation::alerting(
            Level::Danger,
            "Extreme humidity - check!",
            "",
            Severity::Warning,
        )
    } else {
        ChannelEvaluation::quiet(Level::Warning, "Humidity off target", "")
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::Thresholds;

    fn t() -> Thresholds {
        Thresholds::default()
    }

    // -- Gas: ascending buckets over {30, 100, 150} --------------------------

    #[test]
    fn gas_bucket_boundaries() {
        let g = t().gas;
        assert_eq!(evaluate_gas(30.0, &g).level, Level::Normal);
        assert_eq!(evaluate_gas(31.0, &g).level, Level::Warning);
        assert_eq!(evaluate_gas(100.0, &g).level, Level::Warning);
        assert_eq!(evaluate_gas(101.0, &g).level, Level::Danger);
        assert_eq!(evaluate_gas(150.0, &g).level, Level::Danger);
        assert_eq!(evaluate_gas(151.0, &g).level, Level::Critical);
    }

    #[test]
    fn gas_zero_lands_in_clean_bucket() {
        // No absent-sensor special case for gas.
        let e = evaluate_gas(0.0, &t().gas);
        assert_eq!(e.level, Level::Normal);
        assert_eq!(e.message, "Clean air");
    }

    #[test]
    fn gas_never_requests_alerts() {
        let g = t().gas;
        for v in [0.0, 50.0, 120.0, 400.0] {
            assert!(!evaluate_gas(v, &g).should_alert);
        }
    }

    // -- Ultrasonic: inverted buckets over {5, 15, 25} ------------------------

    #[test]
    fn ultrasonic_five_way_mapping() {
        let u = t().ultrasonic;
        assert_eq!(evaluate_ultrasonic(0.0, &u).level, Level::Normal);
        assert_eq!(evaluate_ultrasonic(0.0, &u).message, "No sensor data");
        assert_eq!(evaluate_ultrasonic(5.0, &u).level, Level::Danger);
        assert_eq!(evaluate_ultrasonic(15.0, &u).level, Level::Warning);
        assert_eq!(evaluate_ultrasonic(25.0, &u).level, Level::Normal);
        assert_eq!(evaluate_ultrasonic(26.0, &u).level, Level::Critical);
    }

    #[test]
    fn ultrasonic_full_is_warning_level_with_favorable_message() {
        // Level and sentiment are decoupled on purpose.
        let e = evaluate_ultrasonic(10.0, &t().ultrasonic);
        assert_eq!(e.level, Level::Warning);
        assert_eq!(e.message, "Tank full");
        assert_eq!(e.icon, "🟢");
    }

    #[test]
    fn ultrasonic_negative_reads_as_no_data() {
        assert_eq!(
            evaluate_ultrasonic(-3.0, &t().ultrasonic).message,
            "No sensor data"
        );
    }

    // -- Soil: band with critical-dryness cutoff ------------------------------

    #[test]
    fn soil_zero_is_no_data() {
        let e = evaluate_soil(0.0, &t().plant);
        assert_eq!(e.level, Level::Normal);
        assert!(!e.should_alert);
    }

    #[test]
    fn soil_within_band_is_quiet() {
        for v in [25.0, 50.0, 75.0] {
            let e = evaluate_soil(v, &t().plant);
            assert_eq!(e.level, Level::Normal, "v={v}");
            assert!(!e.should_alert, "v={v}");
        }
    }

    #[test]
    fn soil_below_min_warns() {
        // 70 % of soil_min 25 is 17.5; 20 is dry but not critical.
        let e = evaluate_soil(20.0, &t().plant);
        assert_eq!(e.level, Level::Warning);
        assert!(e.should_alert);
        assert_eq!(e.alert_severity, Severity::Warning);
    }

    #[test]
    fn soil_critically_dry_escalates_to_danger() {
        let e = evaluate_soil(17.0, &t().plant);
        assert_eq!(e.level, Level::Danger);
        assert!(e.should_alert);
        assert_eq!(e.alert_severity, Severity::Danger);
    }

    #[test]
    fn soil_above_max_warns_too_wet() {
        let e = evaluate_soil(80.0, &t().plant);
        assert_eq!(e.level, Level::Warning);
        assert!(e.should_alert);
        assert_eq!(e.message, "Waterlogged - reduce watering");
    }

    // -- Temperature: 3/7/15 bands around 25 ----------------------------------

    #[test]
    fn temperature_bands() {
        let p = t().plant;
        assert_eq!(evaluate_temperature(26.0, &p).level, Level::Normal);
        assert_eq!(evaluate_temperature(30.0, &p).level, Level::Warning);
        assert_eq!(evaluate_temperature(35.0, &p).level, Level::Warning);
        assert_eq!(evaluate_temperature(41.0, &p).level, Level::Danger);
    }

    #[test]
    fn temperature_alerts_only_when_extreme() {
        let p = t().plant;
        assert!(!evaluate_temperature(35.0, &p).should_alert);
        assert!(evaluate_temperature(45.0, &p).should_alert);
        assert!(evaluate_temperature(5.0, &p).should_alert); // symmetric
    }

    #[test]
    fn temperature_zero_is_no_data() {
        let e = evaluate_temperature(0.0, &t().plant);
        assert_eq!(e.level, Level::Normal);
        assert!(!e.should_alert);
    }

    // -- Humidity: 10/20/30 bands around 60 -----------------------------------

    #[test]
    fn humidity_bands() {
        let p = t().plant;
        assert_eq!(evaluate_humidity(65.0, &p).level, Level::Normal);
        assert_eq!(evaluate_humidity(45.0, &p).level, Level::Warning);
        assert_eq!(evaluate_humidity(35.0, &p).level, Level::Warning);
        assert_eq!(evaluate_humidity(25.0, &p).level, Level::Danger);
    }

    #[test]
    fn humidity_alerts_only_when_extreme() {
        let p = t().plant;
        assert!(!evaluate_humidity(38.0, &p).should_alert);
        assert!(evaluate_humidity(95.0, &p).should_alert);
    }

    // -- Severity helper ------------------------------------------------------

    #[test]
    fn informational_severities() {
        assert!(Severity::Info.is_informational());
        assert!(Severity::Success.is_informational());
        assert!(!Severity::Warning.is_informational());
        assert!(!Severity::Danger.is_informational());
    }
}
