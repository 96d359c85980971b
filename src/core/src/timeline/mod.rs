//! Timeline projection types and the event type table.
//!
//! `TimelineEvent`s are ephemeral derived values: never persisted, always
//! recomputed from source data per request. The type table (icon, color,
//! display label per `TimelineEventType`) lives here so adding a new source
//! type touches only the mapping layer, never the sorting/grouping logic.

mod aggregator;

pub use aggregator::TimelineAggregator;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Event Types
// =============================================================================

/// Normalized type tag of a timeline event. Doubles as the filter input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    Created,
    StageChange,
    Observation,
    /// Contamination gets its own high-salience type, separate from other
    /// observations
    Contamination,
    TransferIn,
    TransferOut,
    Harvest,
    Amendment,
    Archived,
}

impl TimelineEventType {
    /// Icon name for display.
    pub const fn icon(&self) -> &'static str {
        match self {
            TimelineEventType::Created => "seedling",
            TimelineEventType::StageChange => "route",
            TimelineEventType::Observation => "eye",
            TimelineEventType::Contamination => "alert-triangle",
            TimelineEventType::TransferIn => "arrow-down-left",
            TimelineEventType::TransferOut => "arrow-up-right",
            TimelineEventType::Harvest => "basket",
            TimelineEventType::Amendment => "pencil",
            TimelineEventType::Archived => "archive",
        }
    }

    /// Accent color for display.
    pub const fn color(&self) -> &'static str {
        match self {
            TimelineEventType::Created => "green",
            TimelineEventType::StageChange => "blue",
            TimelineEventType::Observation => "teal",
            TimelineEventType::Contamination => "red",
            TimelineEventType::TransferIn => "indigo",
            TimelineEventType::TransferOut => "violet",
            TimelineEventType::Harvest => "amber",
            TimelineEventType::Amendment => "gray",
            TimelineEventType::Archived => "slate",
        }
    }
}

// =============================================================================
// Events & Views
// =============================================================================

/// A normalized, read-only projection of a historical occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub event_type: TimelineEventType,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TimelineEvent {
    pub fn new(
        id: Uuid,
        event_type: TimelineEventType,
        timestamp: DateTime<Utc>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id,
            event_type,
            timestamp,
            title: title.into(),
            description: None,
            color: event_type.color().to_string(),
            icon: event_type.icon().to_string(),
            metadata: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One calendar-date bucket of timeline events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineGroup {
    /// The calendar date (UTC) shared by the bucket's events
    pub date: NaiveDate,

    /// Display label: `Today`, `Yesterday`, or `MMM d, yyyy`
    pub label: String,

    /// Events in the bucket, newest first
    pub events: Vec<TimelineEvent>,
}

/// Read-only, serializable timeline projection exposed to the presentation
/// layer. Flattening `groups` reproduces `events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineView {
    pub events: Vec<TimelineEvent>,
    pub groups: Vec<TimelineGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_table_is_total() {
        let all = [
            TimelineEventType::Created,
            TimelineEventType::StageChange,
            TimelineEventType::Observation,
            TimelineEventType::Contamination,
            TimelineEventType::TransferIn,
            TimelineEventType::TransferOut,
            TimelineEventType::Harvest,
            TimelineEventType::Amendment,
            TimelineEventType::Archived,
        ];
        for t in all {
            assert!(!t.icon().is_empty());
            assert!(!t.color().is_empty());
        }
    }

    #[test]
    fn test_event_builder_applies_type_table() {
        let event = TimelineEvent::new(
            Uuid::new_v4(),
            TimelineEventType::Contamination,
            Utc::now(),
            "Contamination flagged",
        );
        assert_eq!(event.color, "red");
        assert_eq!(event.icon, "alert-triangle");
    }
}
