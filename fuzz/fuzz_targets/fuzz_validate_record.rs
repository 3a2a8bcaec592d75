#![no_main]

use libfuzzer_sys::fuzz_target;
use reflectdb::record::validate_record;
use reflectdb::settings::validate_settings;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let once = validate_record(&value).data;
    assert!(!once.id.as_str().is_empty());

    // Repair must be idempotent
    let again = validate_record(&serde_json::to_value(&once).unwrap());
    assert!(!again.repaired);
    assert_eq!(again.data, once);

    let settings = validate_settings(&value).data;
    assert!(settings.reminder_hour <= 23 && settings.reminder_minute <= 59);
});
