//! Type definitions for reflection records.
//!
//! A **record** is one calendar day of journaling. It carries up to four
//! [`Section`]s (good deeds, things to improve, severe slips, missed
//! opportunities), an optional free-text dua and a privacy level.
//!
//! # Wire Shape
//!
//! Records serialize to the camelCase JSON shape used by the export format
//! and by the `records` table:
//!
//! ```text
//! {
//!   "id": "1718000000000-a1b2c3d4e",
//!   "dateISO": "2024-06-10",
//!   "good": { "itemIds": ["fajr"], "qty": { "fajr": 1 } },
//!   "improve": null,
//!   "severeSlip": null,
//!   "missedOpportunity": null,
//!   "privacyLevel": "normal"
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::RecordId;

/// Maximum length of [`Record::dua`] in characters.
pub const MAX_DUA_LENGTH: usize = 5000;

/// Maximum length of [`Section::note`] in characters.
pub const MAX_NOTE_LENGTH: usize = 2000;

/// Maximum length of [`Section::guidance`] and [`Section::intention`] in characters.
pub const MAX_GUIDANCE_LENGTH: usize = 1000;

// ============================================================================
// PrivacyLevel
// ============================================================================

/// How sensitive a record is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    /// No special handling.
    #[default]
    Normal,
    /// Marked private by the user.
    Private,
    /// Never included in period insight requests.
    HighlySensitive,
}

impl PrivacyLevel {
    /// Parses one of the three wire literals.
    pub fn from_literal(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "private" => Some(Self::Private),
            "highly_sensitive" => Some(Self::HighlySensitive),
            _ => None,
        }
    }

    /// Returns the wire literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Private => "private",
            Self::HighlySensitive => "highly_sensitive",
        }
    }
}

// ============================================================================
// Section
// ============================================================================

/// One category of tracked deeds inside a [`Record`].
///
/// Sections are embedded values, never addressed on their own. A valid
/// section always has at least one populated field; an empty one is stored
/// as `null` instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Catalog item ids, in selection order. Not checked against the catalog.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_ids: Vec<String>,

    /// Legacy tag ids, superseded by `item_ids` but still readable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<String>,

    /// Per-item counts. An item without an entry counts as 1.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub qty: BTreeMap<String, u32>,

    /// Free-text note, at most [`MAX_NOTE_LENGTH`] characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Repentance flag. Only meaningful on improve/severe sections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tawbah: Option<bool>,

    /// Guidance text, at most [`MAX_GUIDANCE_LENGTH`] characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,

    /// Intention text, at most [`MAX_GUIDANCE_LENGTH`] characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intention: Option<String>,
}

impl Section {
    /// Creates a section selecting the given catalog items.
    pub fn with_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            item_ids: items.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Sets the count for one item.
    pub fn with_qty(mut self, item: impl Into<String>, count: u32) -> Self {
        self.qty.insert(item.into(), count);
        self
    }

    /// Sets the note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Sets the repentance flag.
    pub fn with_tawbah(mut self, tawbah: bool) -> Self {
        self.tawbah = Some(tawbah);
        self
    }

    /// Returns the count for an item, defaulting to 1 when unset.
    pub fn count_of(&self, item: &str) -> u32 {
        self.qty.get(item).copied().unwrap_or(1)
    }

    /// Returns true if no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
            && self.tag_ids.is_empty()
            && self.qty.is_empty()
            && self.note.is_none()
            && self.tawbah.is_none()
            && self.guidance.is_none()
            && self.intention.is_none()
    }
}

// ============================================================================
// Record
// ============================================================================

/// One day's journaling entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique, immutable id.
    pub id: RecordId,

    /// Calendar date, `YYYY-MM-DD`. At most one record per date.
    #[serde(rename = "dateISO")]
    pub date_iso: String,

    /// Good deeds.
    #[serde(default)]
    pub good: Option<Section>,

    /// Things to improve.
    #[serde(default)]
    pub improve: Option<Section>,

    /// Severe slips.
    #[serde(default)]
    pub severe_slip: Option<Section>,

    /// Missed opportunities.
    #[serde(default)]
    pub missed_opportunity: Option<Section>,

    /// Free-text supplication, at most [`MAX_DUA_LENGTH`] characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dua: Option<String>,

    /// Sensitivity of this record.
    #[serde(default)]
    pub privacy_level: PrivacyLevel,
}

impl Record {
    /// Creates an empty record for the given date with a fresh id.
    pub fn new(date_iso: impl Into<String>) -> Self {
        Self {
            id: RecordId::generate(),
            date_iso: date_iso.into(),
            good: None,
            improve: None,
            severe_slip: None,
            missed_opportunity: None,
            dua: None,
            privacy_level: PrivacyLevel::Normal,
        }
    }

    /// Iterates over the four section slots with their wire names.
    pub fn sections(&self) -> [(&'static str, Option<&Section>); 4] {
        [
            ("good", self.good.as_ref()),
            ("improve", self.improve.as_ref()),
            ("severeSlip", self.severe_slip.as_ref()),
            ("missedOpportunity", self.missed_opportunity.as_ref()),
        ]
    }

    /// Applies a draft on top of this record.
    ///
    /// Shallow per top-level field: a section in the draft replaces the
    /// stored one wholesale, an untouched field keeps its stored value.
    pub fn apply(&mut self, draft: RecordDraft) {
        draft.good.apply_to(&mut self.good);
        draft.improve.apply_to(&mut self.improve);
        draft.severe_slip.apply_to(&mut self.severe_slip);
        draft.missed_opportunity.apply_to(&mut self.missed_opportunity);
        draft.dua.apply_to(&mut self.dua);
        if let Some(level) = draft.privacy_level {
            self.privacy_level = level;
        }
    }
}

// ============================================================================
// RecordDraft - partial input for save_record
// ============================================================================

/// Change to one optional field of a record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Patch<T> {
    /// Keep the stored value.
    #[default]
    Keep,
    /// Clear the stored value.
    Clear,
    /// Replace the stored value.
    Set(T),
}

impl<T> Patch<T> {
    fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(value) => *slot = Some(value),
        }
    }
}

/// Partial record passed to [`ReflectDB::save_record`](crate::ReflectDB::save_record).
///
/// Every field defaults to [`Patch::Keep`], so a draft only touches what it
/// names.
///
/// ```rust
/// use reflectdb::{RecordDraft, Section};
///
/// let draft = RecordDraft::new()
///     .good(Section::with_items(["fajr"]).with_qty("fajr", 1));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordDraft {
    /// Good deeds.
    pub good: Patch<Section>,
    /// Things to improve.
    pub improve: Patch<Section>,
    /// Severe slips.
    pub severe_slip: Patch<Section>,
    /// Missed opportunities.
    pub missed_opportunity: Patch<Section>,
    /// Dua text.
    pub dua: Patch<String>,
    /// Privacy level; `None` keeps the stored level.
    pub privacy_level: Option<PrivacyLevel>,
}

impl RecordDraft {
    /// Creates an empty draft.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the good section.
    pub fn good(mut self, section: Section) -> Self {
        self.good = Patch::Set(section);
        self
    }

    /// Sets the improve section.
    pub fn improve(mut self, section: Section) -> Self {
        self.improve = Patch::Set(section);
        self
    }

    /// Sets the severe slip section.
    pub fn severe_slip(mut self, section: Section) -> Self {
        self.severe_slip = Patch::Set(section);
        self
    }

    /// Sets the missed opportunity section.
    pub fn missed_opportunity(mut self, section: Section) -> Self {
        self.missed_opportunity = Patch::Set(section);
        self
    }

    /// Sets the dua.
    pub fn dua(mut self, dua: impl Into<String>) -> Self {
        self.dua = Patch::Set(dua.into());
        self
    }

    /// Sets the privacy level.
    pub fn privacy_level(mut self, level: PrivacyLevel) -> Self {
        self.privacy_level = Some(level);
        self
    }
}
