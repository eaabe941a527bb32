//! advisory alert labels derived from a single reading.

use crate::domain::{AlertSet, Reading};

pub const RAIN_THRESHOLD: i64 = 90;
pub const HUMIDITY_THRESHOLD: f64 = 98.0;
pub const LOW_LIGHT_THRESHOLD: i64 = 75;
pub const SMOKE_THRESHOLD: i64 = 500;

pub const RAIN_ALERT: &str = "Incoming Rainfall!";
pub const HUMIDITY_ALERT: &str = "High Humidity: Rain likely!";
pub const LOW_LIGHT_ALERT: &str = "Cloudy or Low Light detected!";
// label only, the host takes no action on it
pub const SMOKE_ALERT: &str = "Severe Smoke Detected! Automatic Retract!";

/// evaluate every condition in order; all that apply fire
pub fn evaluate(reading: &Reading) -> AlertSet {
    let mut alerts = Vec::new();

    if reading.rain >= RAIN_THRESHOLD {
        alerts.push(RAIN_ALERT.to_string());
    }
    if reading.humidity >= HUMIDITY_THRESHOLD {
        alerts.push(HUMIDITY_ALERT.to_string());
    }
    if reading.light <= LOW_LIGHT_THRESHOLD {
        alerts.push(LOW_LIGHT_ALERT.to_string());
    }
    if reading.gas_level >= SMOKE_THRESHOLD {
        alerts.push(SMOKE_ALERT.to_string());
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(rain: i64, humidity: f64, light: i64, gas_level: i64) -> Reading {
        Reading { temperature: 20.0, humidity, light, gas_level, rain }
    }

    #[test]
    fn test_all_alerts_in_order() {
        let alerts = evaluate(&reading(95, 99.0, 10, 600));
        assert_eq!(
            alerts,
            vec![
                "Incoming Rainfall!",
                "High Humidity: Rain likely!",
                "Cloudy or Low Light detected!",
                "Severe Smoke Detected! Automatic Retract!",
            ]
        );
    }

    #[test]
    fn test_calm_reading_has_no_alerts() {
        assert!(evaluate(&reading(0, 10.0, 500, 10)).is_empty());
    }

    #[test]
    fn test_rain_boundary() {
        assert!(!evaluate(&reading(89, 10.0, 500, 10)).contains(&RAIN_ALERT.to_string()));
        assert_eq!(evaluate(&reading(90, 10.0, 500, 10)), vec![RAIN_ALERT]);
    }

    #[test]
    fn test_humidity_boundary() {
        assert!(evaluate(&reading(0, 97.9, 500, 10)).is_empty());
        assert_eq!(evaluate(&reading(0, 98.0, 500, 10)), vec![HUMIDITY_ALERT]);
    }

    #[test]
    fn test_light_boundary() {
        assert!(evaluate(&reading(0, 10.0, 76, 10)).is_empty());
        assert_eq!(evaluate(&reading(0, 10.0, 75, 10)), vec![LOW_LIGHT_ALERT]);
    }

    #[test]
    fn test_smoke_boundary() {
        assert!(evaluate(&reading(0, 10.0, 500, 499)).is_empty());
        assert_eq!(evaluate(&reading(0, 10.0, 500, 500)), vec![SMOKE_ALERT]);
    }

    #[test]
    fn test_non_adjacent_alerts_keep_order() {
        assert_eq!(evaluate(&reading(90, 10.0, 500, 500)), vec![RAIN_ALERT, SMOKE_ALERT]);
    }
}
