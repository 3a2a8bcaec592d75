//! Data types for derived insights.
//!
//! Insights are free-text guidance produced by an external service from
//! one entry or a period of entries. The store only keeps the returned
//! text; generating it is the provider's job.

use serde::{Deserialize, Serialize};

use crate::record::{PrivacyLevel, Record};
use crate::types::{InsightId, Timestamp};

/// What an insight was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsightKind {
    /// A single entry's note and selected items.
    Entry,
    /// A span of entries (a week, a month).
    Period,
}

/// A stored derived insight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedInsight {
    /// Unique identifier (UUID v7, time-ordered).
    pub id: InsightId,

    /// What the insight was derived from.
    pub kind: InsightKind,

    /// Short label for listing (the period name, or the start of the note).
    pub subject: String,

    /// The insight text.
    pub content: String,

    /// When this insight was stored.
    pub created_at: Timestamp,
}

/// Input for storing a new insight.
///
/// # Example
///
/// ```rust,ignore
/// use reflectdb::{InsightKind, NewInsight};
///
/// let id = db.store_insight(NewInsight {
///     kind: InsightKind::Period,
///     subject: "2024-W23".to_string(),
///     content: "Consistency improved after the first three days".to_string(),
/// })?;
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewInsight {
    /// What the insight was derived from.
    pub kind: InsightKind,
    /// Short label, at most 200 characters.
    pub subject: String,
    /// The insight text, non-empty and at most 10,000 characters.
    pub content: String,
}

/// A request sent to an [`InsightProvider`](super::InsightProvider).
///
/// Serializes to the untagged request body the insight service expects:
/// `{ "note", "selectedItemTitles" }` or `{ "entries", "period" }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InsightRequest {
    /// Guidance on a single entry.
    Entry {
        /// The user's note for the entry.
        note: String,
        /// Display titles of the items selected in the entry.
        #[serde(rename = "selectedItemTitles")]
        selected_item_titles: Vec<String>,
    },
    /// Guidance over a span of entries.
    Period {
        /// Entries in the period, highly sensitive ones excluded.
        entries: Vec<Record>,
        /// Caller-defined period label, e.g. `"2024-06"`.
        period: String,
    },
}

impl InsightRequest {
    /// Builds an entry request.
    pub fn entry(note: impl Into<String>, selected_item_titles: Vec<String>) -> Self {
        Self::Entry {
            note: note.into(),
            selected_item_titles,
        }
    }

    /// Builds a period request, leaving out highly sensitive records.
    pub fn period<'a>(
        records: impl IntoIterator<Item = &'a Record>,
        period: impl Into<String>,
    ) -> Self {
        Self::Period {
            entries: records
                .into_iter()
                .filter(|r| r.privacy_level != PrivacyLevel::HighlySensitive)
                .cloned()
                .collect(),
            period: period.into(),
        }
    }

    /// The kind of insight this request produces.
    pub fn kind(&self) -> InsightKind {
        match self {
            Self::Entry { .. } => InsightKind::Entry,
            Self::Period { .. } => InsightKind::Period,
        }
    }

    /// The subject the resulting insight is stored under.
    pub fn subject(&self) -> &str {
        match self {
            Self::Entry { note, .. } => note,
            Self::Period { period, .. } => period,
        }
    }
}
