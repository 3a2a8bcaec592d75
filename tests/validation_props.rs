//! Property tests for the record validator.
//!
//! - valid records pass through unchanged and unrepaired
//! - repair is idempotent
//! - any input at all yields a record satisfying every record invariant

use proptest::prelude::*;
use reflectdb::record::{
    validate_record, validate_section, MAX_DUA_LENGTH, MAX_GUIDANCE_LENGTH, MAX_NOTE_LENGTH,
};
use reflectdb::settings::validate_settings;
use reflectdb::{PrivacyLevel, Record, RecordId, Section};
use serde_json::{json, Value};

// ============================================================================
// Strategies
// ============================================================================

fn field_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("id".to_string()),
        Just("dateISO".to_string()),
        Just("good".to_string()),
        Just("improve".to_string()),
        Just("severeSlip".to_string()),
        Just("missedOpportunity".to_string()),
        Just("dua".to_string()),
        Just("privacyLevel".to_string()),
        Just("itemIds".to_string()),
        Just("tagIds".to_string()),
        Just("qty".to_string()),
        Just("note".to_string()),
        Just("tawbah".to_string()),
        Just("guidance".to_string()),
        Just("intention".to_string()),
        "[a-zA-Z]{1,8}",
    ]
}

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Value::from),
        "[0-9]{4}-[0-9]{2}-[0-9]{2}".prop_map(Value::String),
        ".{0,16}".prop_map(Value::String),
        Just(Value::String("highly_sensitive".to_string())),
    ];
    leaf.prop_recursive(4, 48, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(field_name(), inner, 0..8)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_section() -> impl Strategy<Value = Section> {
    (
        prop::collection::vec("[a-z_]{1,10}", 0..4),
        prop::collection::vec("[a-z_]{1,10}", 0..3),
        prop::collection::btree_map("[a-z_]{1,10}", any::<u32>(), 0..4),
        prop::option::of(".{0,40}"),
        prop::option::of(any::<bool>()),
        prop::option::of(".{0,40}"),
        prop::option::of(".{0,40}"),
    )
        .prop_map(
            |(item_ids, tag_ids, qty, note, tawbah, guidance, intention)| Section {
                item_ids,
                tag_ids,
                qty,
                note,
                tawbah,
                guidance,
                intention,
            },
        )
        .prop_filter("sections are never empty", |s| !s.is_empty())
}

fn arb_record() -> impl Strategy<Value = Record> {
    (
        "[a-z0-9-]{1,24}",
        (1970u32..2100, 1u32..=12, 1u32..=28),
        prop::option::of(arb_section()),
        prop::option::of(arb_section()),
        prop::option::of(arb_section()),
        prop::option::of(arb_section()),
        prop::option::of(".{0,60}"),
        prop_oneof![
            Just(PrivacyLevel::Normal),
            Just(PrivacyLevel::Private),
            Just(PrivacyLevel::HighlySensitive),
        ],
    )
        .prop_map(
            |(id, (y, m, d), good, improve, severe_slip, missed_opportunity, dua, privacy_level)| {
                Record {
                    id: RecordId::new(id),
                    date_iso: format!("{:04}-{:02}-{:02}", y, m, d),
                    good,
                    improve,
                    severe_slip,
                    missed_opportunity,
                    dua,
                    privacy_level,
                }
            },
        )
}

fn has_date_shape(s: &str) -> bool {
    s.len() == 10
        && s.char_indices().all(|(i, c)| match i {
            4 | 7 => c == '-',
            _ => c.is_ascii_digit(),
        })
}

fn check_invariants(record: &Record) -> Result<(), TestCaseError> {
    prop_assert!(!record.id.as_str().is_empty());
    prop_assert!(has_date_shape(&record.date_iso), "bad date {}", record.date_iso);
    for (label, section) in record.sections() {
        if let Some(section) = section {
            prop_assert!(!section.is_empty(), "{} is empty", label);
            let text_len = |t: &Option<String>| t.as_ref().map_or(0, |t| t.chars().count());
            prop_assert!(text_len(&section.note) <= MAX_NOTE_LENGTH);
            prop_assert!(text_len(&section.guidance) <= MAX_GUIDANCE_LENGTH);
            prop_assert!(text_len(&section.intention) <= MAX_GUIDANCE_LENGTH);
        }
    }
    if let Some(dua) = &record.dua {
        prop_assert!(dua.chars().count() <= MAX_DUA_LENGTH);
    }

    let wire = serde_json::to_value(record).unwrap();
    prop_assert!(matches!(
        wire["privacyLevel"].as_str(),
        Some("normal" | "private" | "highly_sensitive")
    ));
    Ok(())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn valid_records_round_trip(record in arb_record()) {
        let input = serde_json::to_value(&record).unwrap();
        let report = validate_record(&input);
        prop_assert!(!report.repaired, "warnings: {:?}", report.warnings);
        prop_assert!(report.warnings.is_empty());
        prop_assert_eq!(report.data, record);
    }

    #[test]
    fn repair_is_idempotent(input in arb_json()) {
        let once = validate_record(&input).data;
        let twice = validate_record(&serde_json::to_value(&once).unwrap());
        prop_assert!(!twice.repaired, "warnings: {:?}", twice.warnings);
        prop_assert_eq!(twice.data, once);
    }

    #[test]
    fn any_input_yields_valid_record(input in arb_json()) {
        let report = validate_record(&input);
        prop_assert!(report.is_valid);
        prop_assert_eq!(report.repaired, !report.warnings.is_empty());
        check_invariants(&report.data)?;
    }

    #[test]
    fn record_shaped_input_yields_valid_record(
        fields in prop::collection::btree_map(field_name(), arb_json(), 0..10)
    ) {
        let input = Value::Object(fields.into_iter().collect());
        check_invariants(&validate_record(&input).data)?;
    }

    #[test]
    fn settings_always_in_range(input in arb_json()) {
        let settings = validate_settings(&input).data;
        prop_assert!(settings.reminder_hour <= 23);
        prop_assert!(settings.reminder_minute <= 59);
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn qty_filtering_scenario() {
    let report = validate_section(
        "good",
        &json!({ "itemIds": ["a", "b"], "qty": { "a": 3, "b": -1, "c": "x" } }),
    );
    assert_eq!(
        report.data,
        Some(Section::with_items(["a", "b"]).with_qty("a", 3))
    );
    assert_eq!(
        report.warnings.iter().filter(|w| w.contains("qty")).count(),
        2
    );
}

#[test]
fn section_with_nothing_usable_collapses() {
    let report = validate_section(
        "improve",
        &json!({ "itemIds": [1, 2], "qty": { "a": -5 }, "tawbah": "yes" }),
    );
    assert_eq!(report.data, None);
    assert!(report.repaired);
}

#[test]
fn degenerate_inputs_are_rebuilt() {
    for input in [json!(null), json!({}), json!([]), json!(7), json!("record")] {
        let report = validate_record(&input);
        assert!(report.is_valid);
        assert!(report.repaired);
        assert!(report.data.sections().iter().all(|(_, s)| s.is_none()));
        assert_eq!(report.data.privacy_level, PrivacyLevel::Normal);
    }
}
