//! Version & amendment trail for records.
//!
//! This module handles:
//! - Immutable field-state snapshots (`Version`) with validity intervals
//! - The append-only amendment log that produced them
//! - Point-in-time reads and additive restore via `VersionStore`
//!
//! Versions are identified by `(record_group, number)`. Exactly one version
//! per record group has an open `valid_to` at any time: the current one.

mod store;

pub use store::VersionStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::RecordId;

// =============================================================================
// Versions
// =============================================================================

/// An immutable snapshot of a record's field state.
///
/// Never mutated after creation; closing `valid_to` when a successor is
/// appended is the only change the log ever makes to an existing version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// The record group (the logical record) this version belongs to
    pub record_group: RecordId,

    /// Position in the group's history, starting at 1
    pub number: u32,

    /// Field state captured by this version
    pub fields: serde_json::Value,

    /// Start of the validity interval
    pub valid_from: DateTime<Utc>,

    /// End of the validity interval; `None` marks the current version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
}

impl Version {
    pub fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }
}

// =============================================================================
// Amendments
// =============================================================================

/// The kind of operation that produced a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmendmentType {
    /// The record's initial state (version 1)
    Original,
    /// A field-level correction
    Correction,
    /// A restore of a historical version's fields as a new current version
    Restore,
}

impl AmendmentType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AmendmentType::Original => "original",
            AmendmentType::Correction => "correction",
            AmendmentType::Restore => "restore",
        }
    }
}

impl std::fmt::Display for AmendmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The logged operation that produced a version. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amendment {
    /// The version number this amendment produced
    pub version: u32,

    pub amendment_type: AmendmentType,

    /// Optional human reason ("fixed substrate weight", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// When the amendment was recorded
    pub at: DateTime<Utc>,
}

/// A version paired with the amendment that produced it, as stored in the
/// amendment log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedAmendment {
    pub version: Version,
    pub amendment: Amendment,
}

// =============================================================================
// History State & Views
// =============================================================================

/// State machine position of a record group's history.
///
/// `NoHistory` is a valid, displayable state — a record that was never
/// amended still has exactly one (synthetic) original version, which is
/// distinct from an error or "no data".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryState {
    /// Exactly one original version, no amendment log yet
    NoHistory,
    /// Two or more versions
    Amended,
    /// Current version frozen; amend/restore disabled
    Archived,
}

/// Summary row for one version in a history view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub number: u32,
    pub is_current: bool,
    pub valid_from: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    pub amendment_type: AmendmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amendment_reason: Option<String>,
}

/// Read-only, serializable history projection exposed to the presentation
/// layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionHistoryView {
    pub versions: Vec<VersionSummary>,
    pub amendments: Vec<Amendment>,
    pub is_archived: bool,
    pub state: HistoryState,
}

impl VersionHistoryView {
    /// The current version summary (exactly one per group).
    pub fn current(&self) -> Option<&VersionSummary> {
        self.versions.iter().find(|v| v.is_current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_current() {
        let version = Version {
            record_group: RecordId::new(),
            number: 1,
            fields: serde_json::Value::Null,
            valid_from: Utc::now(),
            valid_to: None,
        };
        assert!(version.is_current());

        let closed = Version {
            valid_to: Some(Utc::now()),
            ..version
        };
        assert!(!closed.is_current());
    }

    #[test]
    fn test_amendment_type_display() {
        assert_eq!(AmendmentType::Original.to_string(), "original");
        assert_eq!(AmendmentType::Restore.to_string(), "restore");
    }
}
