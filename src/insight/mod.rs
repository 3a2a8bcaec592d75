//! Insight management module.
//!
//! A **derived insight** is free-text guidance returned by an external
//! insight service for one entry or a period of entries. The service is
//! reached through the [`InsightProvider`] trait; the store never depends on
//! it being available.
//!
//! # Operations
//!
//! All insight operations are available on [`ReflectDB`](crate::ReflectDB):
//!
//! - [`store_insight(insight)`](crate::ReflectDB::store_insight)
//! - [`get_insight(id)`](crate::ReflectDB::get_insight)
//! - [`recent_insights(limit)`](crate::ReflectDB::recent_insights)
//! - [`delete_insight(id)`](crate::ReflectDB::delete_insight)
//! - [`request_insight(provider, request)`](crate::ReflectDB::request_insight)
//!
//! # Constraints
//!
//! - Content must be non-empty (after trimming) and ≤ 10,000 characters
//! - Subject must be ≤ 200 characters

pub mod types;

pub use types::{DerivedInsight, InsightKind, InsightRequest, NewInsight};

use crate::error::{Result, ValidationError};
use crate::storage::schema::{MAX_INSIGHT_CONTENT_LENGTH, MAX_INSIGHT_SUBJECT_LENGTH};

/// The external insight service.
///
/// Implementations must be thread-safe (`Send + Sync`). Errors are
/// returned as [`ReflectDBError::Insight`](crate::ReflectDBError::Insight)
/// by convention; the facade logs and swallows them.
///
/// # Implementing a Provider
///
/// ```rust,ignore
/// use reflectdb::{InsightProvider, InsightRequest, ReflectDBError, Result};
///
/// struct HttpInsights {
///     client: MyClient,
/// }
///
/// impl InsightProvider for HttpInsights {
///     fn generate(&self, request: &InsightRequest) -> Result<String> {
///         let body = serde_json::to_string(request)?;
///         self.client
///             .post("/insight", body)
///             .map_err(|e| ReflectDBError::insight(e.to_string()))
///     }
/// }
/// ```
pub trait InsightProvider: Send + Sync {
    /// Produces guidance text for the request.
    fn generate(&self, request: &InsightRequest) -> Result<String>;
}

/// Validates a new insight before storage.
pub(crate) fn validate_new_insight(insight: &NewInsight) -> Result<()> {
    if insight.content.trim().is_empty() {
        return Err(ValidationError::required_field("content").into());
    }

    let content_len = insight.content.chars().count();
    if content_len > MAX_INSIGHT_CONTENT_LENGTH {
        return Err(
            ValidationError::content_too_large(content_len, MAX_INSIGHT_CONTENT_LENGTH).into(),
        );
    }

    let subject_len = insight.subject.chars().count();
    if subject_len > MAX_INSIGHT_SUBJECT_LENGTH {
        return Err(ValidationError::invalid_field(
            "subject",
            format!(
                "must be at most {} characters, got {}",
                MAX_INSIGHT_SUBJECT_LENGTH, subject_len
            ),
        )
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_new_insight() -> NewInsight {
        NewInsight {
            kind: InsightKind::Entry,
            subject: "felt rushed at fajr".to_string(),
            content: "Prepare the night before".to_string(),
        }
    }

    #[test]
    fn test_valid_insight_passes() {
        assert!(validate_new_insight(&valid_new_insight()).is_ok());
    }

    #[test]
    fn test_empty_content_rejected() {
        let mut insight = valid_new_insight();
        insight.content = "   ".to_string();
        let err = validate_new_insight(&insight).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("content"));
    }

    #[test]
    fn test_content_too_large_rejected() {
        let mut insight = valid_new_insight();
        insight.content = "x".repeat(MAX_INSIGHT_CONTENT_LENGTH + 1);
        let err = validate_new_insight(&insight).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_content_limit_counts_chars() {
        let mut insight = valid_new_insight();
        insight.content = "é".repeat(MAX_INSIGHT_CONTENT_LENGTH);
        assert!(validate_new_insight(&insight).is_ok());
    }

    #[test]
    fn test_subject_too_long_rejected() {
        let mut insight = valid_new_insight();
        insight.subject = "s".repeat(MAX_INSIGHT_SUBJECT_LENGTH + 1);
        let err = validate_new_insight(&insight).unwrap_err();
        assert!(err.to_string().contains("subject"));
    }
}
