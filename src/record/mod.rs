//! Reflection records.
//!
//! - [`types`]: [`Record`], [`Section`], [`PrivacyLevel`] and the
//!   [`RecordDraft`] used for partial saves
//! - [`validation`]: the pure validator/repairer for untrusted input
//! - [`repair`]: the read-path wrapper that validates stored records and
//!   writes repairs back

pub mod repair;
pub mod types;
pub mod validation;

pub use repair::{
    load_record, load_records, load_settings, save_validated, save_validated_settings,
    LoadReport, LoadedRecord,
};
pub use types::{
    Patch, PrivacyLevel, Record, RecordDraft, Section, MAX_DUA_LENGTH, MAX_GUIDANCE_LENGTH,
    MAX_NOTE_LENGTH,
};
pub use validation::{validate_record, validate_records, validate_section, BatchReport};
