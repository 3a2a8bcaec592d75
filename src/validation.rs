//! Shared pieces of the repair-style validators.
//!
//! Untrusted input (stored bytes, import payloads, caller JSON) is decoded
//! into [`serde_json::Value`] first and then matched field by field. Every
//! validator returns a [`ValidationReport`] carrying a usable value plus the
//! list of corrections that were needed to produce it.
//!
//! ```text
//! untrusted bytes ─► serde_json::Value ─► validate_*() ─► ValidationReport<T>
//!                                              │
//!                                              └─ warnings: what was altered
//! ```

use serde_json::Value;

/// Outcome of validating one untrusted value.
///
/// `data` is always usable. `is_valid` only turns false for input that
/// cannot be repaired; the current validators repair everything, so callers
/// see `is_valid == false` only through future hard-failure paths.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationReport<T> {
    /// Whether the input was usable (possibly after repair).
    pub is_valid: bool,
    /// The repaired value.
    pub data: T,
    /// Hard errors. Empty whenever `is_valid` is true.
    pub errors: Vec<String>,
    /// One human-readable line per correction, in the order applied.
    pub warnings: Vec<String>,
    /// True iff any field required correction.
    pub repaired: bool,
}

impl<T> ValidationReport<T> {
    /// Builds a successful report from the collected warnings.
    pub(crate) fn repaired_from(data: T, warnings: Vec<String>) -> Self {
        Self {
            is_valid: true,
            repaired: !warnings.is_empty(),
            data,
            errors: Vec::new(),
            warnings,
        }
    }

    /// Maps the repaired value, keeping the diagnostics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ValidationReport<U> {
        ValidationReport {
            is_valid: self.is_valid,
            data: f(self.data),
            errors: self.errors,
            warnings: self.warnings,
            repaired: self.repaired,
        }
    }
}

/// Human-readable JSON type name for warning messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Returns the value as an integer if it is a number with no fractional part.
pub(crate) fn whole_number(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Some(f as i64)
        }
        _ => None,
    }
}

/// Truncates `text` to at most `max` characters.
///
/// Returns the (possibly shortened) text and whether anything was cut.
pub(crate) fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}
