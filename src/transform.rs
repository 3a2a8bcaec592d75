//! Data transformer for imported payloads.
//!
//! Import runs every entry through this module before validation. The
//! transformer applies the per-version upgrades needed to bring an entry
//! written under an older data version to the current shape, then fills
//! every required field. Validation still runs afterwards.
//!
//! ```text
//! payload.entries[i] ─► upgrade(from_version) ─► fill defaults ─► Record
//!                              │
//!                              └─ non-object entry: dropped, counted
//! ```

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::record::validation::validate_record;
use crate::record::Record;
use crate::settings::{validate_settings, Settings};
use crate::storage::DATA_VERSION;
use crate::validation::{type_name, ValidationReport};

/// Per-version upgrade applied to a record's fields.
///
/// An entry under version `v` is the step that brings a version `v - 1`
/// entry to version `v`.
type Upgrade = fn(&mut Map<String, Value>);

/// Record upgrades, ascending. Version 1 is the first data version, so
/// nothing is registered yet.
const RECORD_UPGRADES: &[(u32, Upgrade)] = &[];

/// Why a single entry could not be transformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The entry is not a JSON object.
    #[error("expected object, got {0}")]
    NotAnObject(&'static str),
}

/// Result of transforming a batch of entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformReport {
    /// Transformed records, in input order.
    pub records: Vec<Record>,
    /// Entries dropped because they could not be transformed.
    pub dropped: usize,
    /// Entries that needed at least one field filled or corrected.
    pub repaired: usize,
    /// Per-entry diagnostics, prefixed with the entry index.
    pub warnings: Vec<String>,
}

/// Parses an advertised version number.
///
/// Numbers are floored, numeric strings are parsed. Anything else, and any
/// result below 1, yields 1.
///
/// # Example
/// ```
/// use reflectdb::transform::get_safe_version;
/// use serde_json::json;
///
/// assert_eq!(get_safe_version(Some(&json!(1.9))), 1);
/// assert_eq!(get_safe_version(Some(&json!("3"))), 3);
/// assert_eq!(get_safe_version(Some(&json!("v2"))), 1);
/// assert_eq!(get_safe_version(None), 1);
/// ```
pub fn get_safe_version(raw: Option<&Value>) -> u32 {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() && v >= 1.0 => v.floor().min(f64::from(u32::MAX)) as u32,
        _ => 1,
    }
}

/// Returns true if data written under `version` can be imported.
pub fn is_compatible_version(version: u32) -> bool {
    (1..=DATA_VERSION).contains(&version)
}

fn upgrade_fields(fields: &mut Map<String, Value>, from_version: u32) {
    for (version, upgrade) in RECORD_UPGRADES {
        if *version > from_version && *version <= DATA_VERSION {
            upgrade(fields);
        }
    }
}

fn transform_with_report(
    raw: &Value,
    from_version: u32,
) -> Result<ValidationReport<Record>, TransformError> {
    let Value::Object(fields) = raw else {
        return Err(TransformError::NotAnObject(type_name(raw)));
    };
    let mut fields = fields.clone();
    upgrade_fields(&mut fields, from_version);
    Ok(validate_record(&Value::Object(fields)))
}

/// Brings one entry written under `from_version` to the current shape.
///
/// Every missing or malformed field is filled the way [`validate_record`]
/// fills it, so an object always yields a complete record.
///
/// # Errors
///
/// Returns [`TransformError::NotAnObject`] if `raw` is not a JSON object.
/// [`transform_records`] drops such an entry and keeps going, so one bad
/// entry never aborts an import.
pub fn transform_record(raw: &Value, from_version: u32) -> Result<Record, TransformError> {
    transform_with_report(raw, from_version).map(|report| report.data)
}

/// Transforms every entry, dropping those that fail instead of aborting.
pub fn transform_records(raw: &[Value], from_version: u32) -> TransformReport {
    let mut report = TransformReport::default();

    for (index, entry) in raw.iter().enumerate() {
        match transform_with_report(entry, from_version) {
            Ok(transformed) => {
                if transformed.repaired {
                    report.repaired += 1;
                }
                report.warnings.extend(
                    transformed
                        .warnings
                        .into_iter()
                        .map(|w| format!("entry {}: {}", index, w)),
                );
                report.records.push(transformed.data);
            }
            Err(e) => {
                warn!(index, error = %e, "Dropping entry that could not be transformed");
                report.dropped += 1;
                report
                    .warnings
                    .push(format!("entry {}: dropped, {}", index, e));
            }
        }
    }

    report
}

/// Parses a legacy `"HH:MM"` reminder time.
fn parse_reminder_time(text: &str) -> Option<(u8, u8)> {
    let (hour, minute) = text.trim().split_once(':')?;
    let hour: u8 = hour.trim().parse().ok()?;
    let minute: u8 = minute.trim().parse().ok()?;
    (hour <= 23 && minute <= 59).then_some((hour, minute))
}

/// Brings settings written under `from_version` to the current shape.
///
/// Accepts the legacy combined `reminderTime: "HH:MM"` field when the
/// separate hour and minute fields are absent. An unparsable time falls
/// back to the default reminder time. Every value that had to change is
/// described in the report's warnings.
pub fn transform_settings(raw: &Value, _from_version: u32) -> ValidationReport<Settings> {
    let Value::Object(fields) = raw else {
        return validate_settings(raw);
    };

    let mut legacy_warnings = Vec::new();
    let mut fields = fields.clone();
    if let Some(legacy) = fields.remove("reminderTime") {
        let split_present =
            fields.contains_key("reminderHour") || fields.contains_key("reminderMinute");
        if split_present {
            legacy_warnings.push(format!(
                "reminderTime: {} ignored, reminderHour/reminderMinute take precedence",
                legacy
            ));
        } else {
            match legacy.as_str().and_then(parse_reminder_time) {
                Some((hour, minute)) => {
                    fields.insert("reminderHour".to_string(), Value::from(hour));
                    fields.insert("reminderMinute".to_string(), Value::from(minute));
                }
                None => legacy_warnings.push(format!(
                    "reminderTime: {} is not a valid HH:MM time; reset to default",
                    legacy
                )),
            }
        }
    }

    let report = validate_settings(&Value::Object(fields));
    if legacy_warnings.is_empty() {
        return report;
    }
    legacy_warnings.extend(report.warnings);
    ValidationReport::repaired_from(report.data, legacy_warnings)
}
