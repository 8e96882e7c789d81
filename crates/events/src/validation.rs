//! Intake-time validation.
//!
//! Two rule sets run on every event:
//!
//! - the source must be 2..=100 characters after trimming
//! - events whose payload carries `alert_type = "temperature_difference"` must
//!   describe plausible indoor temperature readings (see [`validate_event`])

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::event::{Event, Payload};

const MIN_SOURCE_LEN: usize = 2;
const MAX_SOURCE_LEN: usize = 100;

const MIN_TEMPERATURE: f64 = 0.0;
const MAX_TEMPERATURE: f64 = 40.0;
const DIFFERENCE_TOLERANCE: f64 = 0.5;

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Stable machine-readable code (e.g. `invalid.temperature.range`).
    pub code: &'static str,
    pub message: String,
}

impl Violation {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// All rules an event failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", summary(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn summary(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate an event before it enters the relay.
///
/// Temperature alerts must have:
/// - at least one `temperature_*` key (other than `temperature_difference`)
///   holding an object with a numeric `value` or `temperature` in 0..=40 °C and
///   a non-blank `entity_id` or `sensor_id`
/// - a positive numeric `threshold` (numbers or numeric strings)
/// - if `temperature_difference` is given and there are two or more sensors, a
///   value within 0.5 °C of the absolute difference of the first two sensors
///   (in key order)
pub fn validate_event(event: &Event) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    let source_len = event.source().trim().chars().count();
    if source_len == 0 {
        violations.push(Violation::new("missing.source", "source is required"));
    } else if !(MIN_SOURCE_LEN..=MAX_SOURCE_LEN).contains(&source_len) {
        violations.push(Violation::new(
            "invalid.source.length",
            format!("source must be between {MIN_SOURCE_LEN} and {MAX_SOURCE_LEN} characters"),
        ));
    }

    if is_temperature_alert(event.payload()) {
        validate_temperature(event.payload(), &mut violations);
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

fn is_temperature_alert(payload: &Payload) -> bool {
    payload.get("alert_type").and_then(Value::as_str) == Some("temperature_difference")
}

fn validate_temperature(payload: &Payload, violations: &mut Vec<Violation>) {
    let sensors: Vec<&str> = payload
        .keys()
        .map(String::as_str)
        .filter(|k| k.starts_with("temperature_") && *k != "temperature_difference")
        .collect();

    if sensors.is_empty() {
        violations.push(Violation::new(
            "missing.temperature.sensors",
            "no temperature sensors found in payload",
        ));
        return;
    }

    for key in &sensors {
        validate_sensor(payload, key, violations);
    }

    match number(payload.get("threshold")) {
        None => violations.push(Violation::new(
            "missing.threshold",
            "temperature threshold is required for temperature events",
        )),
        Some(t) if t <= 0.0 => violations.push(Violation::new(
            "invalid.threshold",
            "temperature threshold must be greater than 0",
        )),
        Some(_) => {}
    }

    if sensors.len() >= 2 {
        validate_difference(payload, sensors[0], sensors[1], violations);
    }
}

fn validate_sensor(payload: &Payload, key: &str, violations: &mut Vec<Violation>) {
    let Some(sensor) = payload.get(key).and_then(Value::as_object) else {
        violations.push(Violation::new(
            "missing.sensor.data",
            format!("sensor data for '{key}' is missing or invalid"),
        ));
        return;
    };

    match reading(sensor) {
        None => violations.push(Violation::new(
            "invalid.temperature.value",
            format!("temperature value for '{key}' must be a valid number"),
        )),
        Some(t) if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&t) => {
            violations.push(Violation::new(
                "invalid.temperature.range",
                format!(
                    "temperature for '{key}' ({t}°C) must be between {MIN_TEMPERATURE}°C and {MAX_TEMPERATURE}°C"
                ),
            ))
        }
        Some(_) => {}
    }

    let entity = sensor
        .get("entity_id")
        .or_else(|| sensor.get("sensor_id"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if entity.is_empty() {
        violations.push(Violation::new(
            "missing.entity.id",
            format!("entity id for '{key}' is required (e.g. 'sensor.bedroom_temperature')"),
        ));
    }
}

fn validate_difference(payload: &Payload, first: &str, second: &str, violations: &mut Vec<Violation>) {
    let Some(reported) = number(payload.get("temperature_difference")) else {
        return;
    };

    let a = payload.get(first).and_then(Value::as_object).and_then(reading);
    let b = payload.get(second).and_then(Value::as_object).and_then(reading);

    if let (Some(a), Some(b)) = (a, b) {
        let computed = (a - b).abs();
        if (computed - reported).abs() > DIFFERENCE_TOLERANCE {
            violations.push(Violation::new(
                "invalid.temperature.difference",
                format!(
                    "temperature difference ({reported}°C) doesn't match calculated difference ({computed:.1}°C)"
                ),
            ));
        }
    }
}

fn reading(sensor: &serde_json::Map<String, Value>) -> Option<f64> {
    sensor
        .get("value")
        .and_then(Value::as_f64)
        .or_else(|| sensor.get("temperature").and_then(Value::as_f64))
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
