//! Data types for application settings.

use serde::{Deserialize, Serialize};

/// Default daily reminder hour (21:00).
pub const DEFAULT_REMINDER_HOUR: u8 = 21;

/// Default daily reminder minute.
pub const DEFAULT_REMINDER_MINUTE: u8 = 0;

/// Application settings. One instance per store.
///
/// Always fully populated: partial input is merged onto [`Settings::default`]
/// before it is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Reminder hour, `0..=23`.
    pub reminder_hour: u8,
    /// Reminder minute, `0..=59`.
    pub reminder_minute: u8,
    /// Require biometric unlock on launch.
    pub biometric_lock: bool,
    /// Hide entry contents on shared screens.
    pub private_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reminder_hour: DEFAULT_REMINDER_HOUR,
            reminder_minute: DEFAULT_REMINDER_MINUTE,
            biometric_lock: false,
            private_mode: false,
        }
    }
}

impl Settings {
    /// Returns this settings value with the `Some` fields of `update` applied.
    pub fn merged(mut self, update: &SettingsUpdate) -> Self {
        if let Some(hour) = update.reminder_hour {
            self.reminder_hour = hour;
        }
        if let Some(minute) = update.reminder_minute {
            self.reminder_minute = minute;
        }
        if let Some(lock) = update.biometric_lock {
            self.biometric_lock = lock;
        }
        if let Some(private) = update.private_mode {
            self.private_mode = private;
        }
        self
    }
}

/// Partial settings for [`ReflectDB::update_settings`](crate::ReflectDB::update_settings).
///
/// Only `Some` fields are applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    /// New reminder hour.
    pub reminder_hour: Option<u8>,
    /// New reminder minute.
    pub reminder_minute: Option<u8>,
    /// New biometric lock flag.
    pub biometric_lock: Option<bool>,
    /// New private mode flag.
    pub private_mode: Option<bool>,
}
