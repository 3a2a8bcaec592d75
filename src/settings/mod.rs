//! Application settings module.
//!
//! Settings are a singleton: one fully-populated [`Settings`] value per
//! store, created with defaults on first open and only ever updated.
//!
//! # Rules
//!
//! | Field | Accepted |
//! |-------|----------|
//! | `reminderHour` | whole number in `0..=23` |
//! | `reminderMinute` | whole number in `0..=59` |
//! | `biometricLock` | boolean |
//! | `privateMode` | boolean |
//!
//! A field that is present but invalid is replaced with its default and a
//! warning is raised. An absent (or `null`) field is defaulted silently.

pub mod types;

pub use types::{Settings, SettingsUpdate, DEFAULT_REMINDER_HOUR, DEFAULT_REMINDER_MINUTE};

use serde_json::{Map, Value};

use crate::validation::{type_name, whole_number, ValidationReport};

const SETTINGS_FIELDS: [&str; 4] = [
    "reminderHour",
    "reminderMinute",
    "biometricLock",
    "privateMode",
];

/// Validates and repairs untrusted settings input.
pub fn validate_settings(input: &Value) -> ValidationReport<Settings> {
    let mut warnings = Vec::new();
    let defaults = Settings::default();

    let empty = Map::new();
    let fields = match input {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            warnings.push(format!(
                "expected object, got {}; using defaults",
                type_name(other)
            ));
            &empty
        }
    };

    for key in fields.keys() {
        if !SETTINGS_FIELDS.contains(&key.as_str()) {
            warnings.push(format!("ignored unknown field '{}'", key));
        }
    }

    let settings = Settings {
        reminder_hour: bounded_int(
            fields.get("reminderHour"),
            "reminderHour",
            23,
            defaults.reminder_hour,
            &mut warnings,
        ),
        reminder_minute: bounded_int(
            fields.get("reminderMinute"),
            "reminderMinute",
            59,
            defaults.reminder_minute,
            &mut warnings,
        ),
        biometric_lock: flag(
            fields.get("biometricLock"),
            "biometricLock",
            defaults.biometric_lock,
            &mut warnings,
        ),
        private_mode: flag(
            fields.get("privateMode"),
            "privateMode",
            defaults.private_mode,
            &mut warnings,
        ),
    };

    ValidationReport::repaired_from(settings, warnings)
}

fn bounded_int(
    value: Option<&Value>,
    field: &str,
    max: u8,
    default: u8,
    warnings: &mut Vec<String>,
) -> u8 {
    match value {
        None | Some(Value::Null) => default,
        Some(v) => match whole_number(v) {
            Some(n) if (0..=i64::from(max)).contains(&n) => n as u8,
            _ => {
                warnings.push(format!(
                    "{}: {} is not a whole number in 0..={}; reset to {}",
                    field, v, max, default
                ));
                default
            }
        },
    }
}

fn flag(value: Option<&Value>, field: &str, default: bool, warnings: &mut Vec<String>) -> bool {
    match value {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            warnings.push(format!(
                "{}: invalid {} value reset to {}",
                field,
                type_name(other),
                default
            ));
            default
        }
    }
}
