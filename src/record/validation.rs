//! Repairing validation for records.
//!
//! Turns arbitrary untrusted JSON into a [`Record`] that satisfies every
//! record invariant. Nothing here fails: invalid fields are replaced with
//! safe defaults and each replacement is reported as a warning.
//!
//! # Validation Layers
//!
//! ```text
//! validate_records()              ← batch, counts + prefixed warnings
//!     └── validate_record()       ← id, dateISO, dua, privacyLevel
//!             └── validate_section(label)   × good / improve /
//!                                             severeSlip / missedOpportunity
//! ```
//!
//! # Rules
//!
//! | Field | Accepted | Otherwise |
//! |-------|----------|-----------|
//! | `id` | non-empty string | fresh id, warning |
//! | `dateISO` | `YYYY-MM-DD` | today, warning |
//! | sections | object with ≥1 usable field | `null` (warning unless absent/null) |
//! | `dua` | string, truncated to 5000 chars | omitted, warning |
//! | `privacyLevel` | `normal` / `private` / `highly_sensitive` | `normal`, warning unless absent |

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::record::types::{
    PrivacyLevel, Record, Section, MAX_DUA_LENGTH, MAX_GUIDANCE_LENGTH, MAX_NOTE_LENGTH,
};
use crate::types::{is_date_iso, today_iso, RecordId};
use crate::validation::{truncate_chars, type_name, whole_number, ValidationReport};

const RECORD_FIELDS: [&str; 8] = [
    "id",
    "dateISO",
    "good",
    "improve",
    "severeSlip",
    "missedOpportunity",
    "dua",
    "privacyLevel",
];

const SECTION_FIELDS: [&str; 7] = [
    "itemIds",
    "tagIds",
    "qty",
    "note",
    "tawbah",
    "guidance",
    "intention",
];

/// Result of validating a batch of records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    /// Records that came out usable, in input order.
    pub valid: Vec<Record>,
    /// Inputs rejected outright.
    pub invalid: usize,
    /// Inputs that needed at least one correction.
    pub repaired: usize,
    /// All warnings, each prefixed with the input index.
    pub warnings: Vec<String>,
}

/// Validates and repairs one record.
///
/// Accepts anything: `null`, arrays and primitives are treated as an empty
/// object, so the result is a fresh record dated today.
pub fn validate_record(input: &Value) -> ValidationReport<Record> {
    let mut warnings = Vec::new();

    let empty = Map::new();
    let fields = match input {
        Value::Object(map) => map,
        other => {
            warnings.push(format!(
                "record: expected object, got {}; rebuilt from defaults",
                type_name(other)
            ));
            &empty
        }
    };

    for key in fields.keys() {
        if !RECORD_FIELDS.contains(&key.as_str()) {
            warnings.push(format!("record: ignored unknown field '{}'", key));
        }
    }

    let id = match fields.get("id") {
        Some(Value::String(s)) if !s.is_empty() => RecordId::new(s.clone()),
        Some(other) => {
            let id = RecordId::generate();
            warnings.push(format!(
                "id: invalid {} value replaced with generated id {}",
                type_name(other),
                id
            ));
            id
        }
        None => {
            let id = RecordId::generate();
            warnings.push(format!("id: missing, generated {}", id));
            id
        }
    };

    let date_iso = match fields.get("dateISO") {
        Some(Value::String(s)) if is_date_iso(s) => s.clone(),
        Some(Value::String(s)) => {
            let today = today_iso();
            warnings.push(format!(
                "dateISO: malformed date '{}' replaced with {}",
                s, today
            ));
            today
        }
        Some(other) => {
            let today = today_iso();
            warnings.push(format!(
                "dateISO: invalid {} value replaced with {}",
                type_name(other),
                today
            ));
            today
        }
        None => {
            let today = today_iso();
            warnings.push(format!("dateISO: missing, set to {}", today));
            today
        }
    };

    let mut section = |label: &str| -> Option<Section> {
        let value = fields.get(label).unwrap_or(&Value::Null);
        let report = validate_section(label, value);
        warnings.extend(report.warnings);
        report.data
    };
    let good = section("good");
    let improve = section("improve");
    let severe_slip = section("severeSlip");
    let missed_opportunity = section("missedOpportunity");

    let dua = match fields.get("dua") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let (text, cut) = truncate_chars(s, MAX_DUA_LENGTH);
            if cut {
                warnings.push(format!("dua: truncated to {} characters", MAX_DUA_LENGTH));
            }
            Some(text)
        }
        Some(other) => {
            warnings.push(format!(
                "dua: dropped {} value, expected string",
                type_name(other)
            ));
            None
        }
    };

    let privacy_level = match fields.get("privacyLevel") {
        None | Some(Value::Null) => PrivacyLevel::Normal,
        Some(Value::String(s)) => PrivacyLevel::from_literal(s).unwrap_or_else(|| {
            warnings.push(format!(
                "privacyLevel: unknown level '{}' replaced with normal",
                s
            ));
            PrivacyLevel::Normal
        }),
        Some(other) => {
            warnings.push(format!(
                "privacyLevel: invalid {} value replaced with normal",
                type_name(other)
            ));
            PrivacyLevel::Normal
        }
    };

    let record = Record {
        id,
        date_iso,
        good,
        improve,
        severe_slip,
        missed_opportunity,
        dua,
        privacy_level,
    };

    ValidationReport::repaired_from(record, warnings)
}

/// Validates and repairs one section.
///
/// `label` is the section's field name and only appears in warnings.
/// Absent or `null` input yields `None` without a warning; any other input
/// that has no usable field left after filtering also yields `None`.
pub fn validate_section(label: &str, input: &Value) -> ValidationReport<Option<Section>> {
    let mut warnings = Vec::new();

    let fields = match input {
        Value::Null => return ValidationReport::repaired_from(None, warnings),
        Value::Object(map) => map,
        other => {
            warnings.push(format!(
                "{}: expected object, got {}; stored as null",
                label,
                type_name(other)
            ));
            return ValidationReport::repaired_from(None, warnings);
        }
    };

    for key in fields.keys() {
        if !SECTION_FIELDS.contains(&key.as_str()) {
            warnings.push(format!("{}: ignored unknown field '{}'", label, key));
        }
    }

    let section = Section {
        item_ids: string_list(label, "itemIds", fields.get("itemIds"), &mut warnings),
        tag_ids: string_list(label, "tagIds", fields.get("tagIds"), &mut warnings),
        qty: qty_map(label, fields.get("qty"), &mut warnings),
        note: bounded_text(label, "note", fields.get("note"), MAX_NOTE_LENGTH, &mut warnings),
        tawbah: match fields.get("tawbah") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                warnings.push(format!(
                    "{}.tawbah: dropped {} value, expected boolean",
                    label,
                    type_name(other)
                ));
                None
            }
        },
        guidance: bounded_text(
            label,
            "guidance",
            fields.get("guidance"),
            MAX_GUIDANCE_LENGTH,
            &mut warnings,
        ),
        intention: bounded_text(
            label,
            "intention",
            fields.get("intention"),
            MAX_GUIDANCE_LENGTH,
            &mut warnings,
        ),
    };

    if section.is_empty() {
        warnings.push(format!("{}: no usable fields, stored as null", label));
        return ValidationReport::repaired_from(None, warnings);
    }

    ValidationReport::repaired_from(Some(section), warnings)
}

/// Validates every element, keeping the usable records in order.
pub fn validate_records(inputs: &[Value]) -> BatchReport {
    let mut batch = BatchReport::default();

    for (index, input) in inputs.iter().enumerate() {
        let report = validate_record(input);
        batch.warnings.extend(
            report
                .warnings
                .iter()
                .chain(report.errors.iter())
                .map(|w| format!("entry {}: {}", index, w)),
        );
        if !report.is_valid {
            batch.invalid += 1;
            continue;
        }
        if report.repaired {
            batch.repaired += 1;
        }
        batch.valid.push(report.data);
    }

    batch
}

fn string_list(
    label: &str,
    field: &str,
    value: Option<&Value>,
    warnings: &mut Vec<String>,
) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                Value::String(s) => Some(s.clone()),
                other => {
                    warnings.push(format!(
                        "{}.{}: dropped non-string entry at index {} ({})",
                        label,
                        field,
                        i,
                        type_name(other)
                    ));
                    None
                }
            })
            .collect(),
        Some(other) => {
            warnings.push(format!(
                "{}.{}: dropped {} value, expected array",
                label,
                field,
                type_name(other)
            ));
            Vec::new()
        }
    }
}

fn qty_map(
    label: &str,
    value: Option<&Value>,
    warnings: &mut Vec<String>,
) -> BTreeMap<String, u32> {
    let entries = match value {
        None | Some(Value::Null) => return BTreeMap::new(),
        Some(Value::Object(entries)) => entries,
        Some(other) => {
            warnings.push(format!(
                "{}.qty: dropped {} value, expected object",
                label,
                type_name(other)
            ));
            return BTreeMap::new();
        }
    };

    let mut qty = BTreeMap::new();
    for (item, count) in entries {
        match (count, whole_number(count)) {
            (_, Some(n)) if n < 0 => warnings.push(format!(
                "{}.qty: dropped entry '{}' (negative count {})",
                label, item, n
            )),
            (_, Some(n)) => match u32::try_from(n) {
                Ok(n) => {
                    qty.insert(item.clone(), n);
                }
                Err(_) => warnings.push(format!(
                    "{}.qty: dropped entry '{}' (count {} out of range)",
                    label, item, n
                )),
            },
            (Value::Number(n), None) => warnings.push(format!(
                "{}.qty: dropped entry '{}' (count {} is not a whole number)",
                label, item, n
            )),
            (other, None) => warnings.push(format!(
                "{}.qty: dropped entry '{}' (expected number, got {})",
                label,
                item,
                type_name(other)
            )),
        }
    }
    qty
}

fn bounded_text(
    label: &str,
    field: &str,
    value: Option<&Value>,
    max: usize,
    warnings: &mut Vec<String>,
) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let (text, cut) = truncate_chars(s, max);
            if cut {
                warnings.push(format!(
                    "{}.{}: truncated to {} characters",
                    label, field, max
                ));
            }
            Some(text)
        }
        Some(other) => {
            warnings.push(format!(
                "{}.{}: dropped {} value, expected string",
                label,
                field,
                type_name(other)
            ));
            None
        }
    }
}
