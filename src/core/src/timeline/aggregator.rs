//! The timeline aggregator: map, merge, filter, sort, group.

use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::model::{
    FlushEvent, Observation, ObservationKind, Record, TransferDirection, TransferEvent,
};
use crate::timeline::{TimelineEvent, TimelineEventType, TimelineGroup, TimelineView};
use crate::version::{AmendmentType, VersionHistoryView};

/// Merges a record's heterogeneous event sources into one chronologically
/// ordered, filterable, groupable sequence.
///
/// Pure and synchronous: operates only on the materialized record and an
/// optional pre-fetched history view, and recomputes everything per request.
#[derive(Debug, Default)]
pub struct TimelineAggregator;

impl TimelineAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Build the timeline view for a record.
    ///
    /// An empty `filter` means no filtering, not "exclude all". Source
    /// entries with missing timestamps are dropped with a logged warning
    /// rather than corrupting the sort order.
    pub fn aggregate(
        &self,
        record: &Record,
        history: Option<&VersionHistoryView>,
        filter: &HashSet<TimelineEventType>,
    ) -> TimelineView {
        // Step 1: map each source collection independently.
        let mut events = Vec::new();
        events.push(map_creation(record));
        for obs in &record.observations {
            if let Some(event) = map_observation(record, obs) {
                events.push(event);
            }
        }
        for transfer in &record.transfers {
            if let Some(event) = map_transfer(record, transfer) {
                events.push(event);
            }
        }
        for flush in &record.flushes {
            if let Some(event) = map_flush(record, flush) {
                events.push(event);
            }
        }
        if let Some(history) = history {
            events.extend(map_amendments(record, history));
        }
        if let Some(event) = map_archive(record) {
            events.push(event);
        }

        // Step 3: empty filter set keeps everything.
        if !filter.is_empty() {
            events.retain(|e| filter.contains(&e.event_type));
        }

        // Step 4: newest first; the stable sort keeps source order on ties.
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        // Step 5: bucket by calendar date, bucket order following the sort.
        let groups = group_by_date(&events);

        TimelineView { events, groups }
    }
}

// =============================================================================
// Source Mapping
// =============================================================================

fn map_creation(record: &Record) -> TimelineEvent {
    TimelineEvent::new(
        record.id.0,
        TimelineEventType::Created,
        record.created_at,
        format!("{} created", capitalize(record.kind.as_str())),
    )
    .with_description(record.name.clone())
}

fn map_observation(record: &Record, obs: &Observation) -> Option<TimelineEvent> {
    let Some(timestamp) = obs.timestamp else {
        tracing::warn!(
            record = %record.id,
            observation = %obs.id,
            "Observation has no usable timestamp; dropped from timeline"
        );
        return None;
    };

    let (event_type, title) = match obs.kind {
        ObservationKind::Contamination => {
            (TimelineEventType::Contamination, "Contamination flagged")
        }
        ObservationKind::StageChange => (TimelineEventType::StageChange, "Stage changed"),
        ObservationKind::Growth => (TimelineEventType::Observation, "Growth observed"),
        ObservationKind::Note => (TimelineEventType::Observation, "Note added"),
    };

    let mut event = TimelineEvent::new(obs.id, event_type, timestamp, title);
    if let Some(stage) = &obs.stage {
        event = event.with_metadata(serde_json::json!({ "stage": stage }));
        event.title = format!("Stage changed to {}", stage);
    }
    if let Some(note) = &obs.note {
        event = event.with_description(note.clone());
    }
    Some(event)
}

fn map_transfer(record: &Record, transfer: &TransferEvent) -> Option<TimelineEvent> {
    let Some(timestamp) = transfer.timestamp else {
        tracing::warn!(
            record = %record.id,
            transfer = %transfer.id,
            "Transfer has no usable timestamp; dropped from timeline"
        );
        return None;
    };

    let (event_type, title) = match transfer.direction {
        TransferDirection::In => (TimelineEventType::TransferIn, "Transferred in"),
        TransferDirection::Out => (TimelineEventType::TransferOut, "Transferred out"),
    };

    let mut event = TimelineEvent::new(transfer.id, event_type, timestamp, title);
    if let Some(counterpart) = transfer.counterpart {
        event = event.with_metadata(serde_json::json!({
            "counterpart": counterpart,
            "counterpart_kind": transfer.counterpart_kind,
        }));
    }
    if let Some(note) = &transfer.note {
        event = event.with_description(note.clone());
    }
    Some(event)
}

fn map_flush(record: &Record, flush: &FlushEvent) -> Option<TimelineEvent> {
    let Some(timestamp) = flush.timestamp else {
        tracing::warn!(
            record = %record.id,
            flush = %flush.id,
            "Flush has no usable timestamp; dropped from timeline"
        );
        return None;
    };

    let mut event = TimelineEvent::new(
        flush.id,
        TimelineEventType::Harvest,
        timestamp,
        "Harvest recorded",
    );
    if let Some(note) = &flush.note {
        event = event.with_description(note.clone());
    } else if let Some(grams) = flush.yield_grams {
        event = event.with_description(format!("{grams} g wet"));
    }
    if let Some(grams) = flush.yield_grams {
        event = event.with_metadata(serde_json::json!({ "yield_grams": grams }));
    }
    Some(event)
}

/// Amendments after the original become timeline entries; the original is
/// already represented by the creation event.
///
/// Timelines are recomputed per request, so derived events need ids that are
/// stable across recomputations: a name-based uuid under the record group.
fn map_amendments(record: &Record, history: &VersionHistoryView) -> Vec<TimelineEvent> {
    history
        .amendments
        .iter()
        .filter(|a| a.amendment_type != AmendmentType::Original)
        .map(|a| {
            let title = match a.amendment_type {
                AmendmentType::Restore => "Version restored",
                _ => "Record amended",
            };
            let id = Uuid::new_v5(&record.id.0, format!("amendment:{}", a.version).as_bytes());
            let mut event = TimelineEvent::new(id, TimelineEventType::Amendment, a.at, title)
                .with_metadata(serde_json::json!({ "version": a.version }));
            if let Some(reason) = &a.reason {
                event = event.with_description(reason.clone());
            }
            event
        })
        .collect()
}

fn map_archive(record: &Record) -> Option<TimelineEvent> {
    if !record.status.is_archived() {
        return None;
    }
    let Some(timestamp) = record.archived_at else {
        tracing::warn!(
            record = %record.id,
            "Archived record has no archive timestamp; archive event dropped"
        );
        return None;
    };
    Some(TimelineEvent::new(
        Uuid::new_v5(&record.id.0, b"archived"),
        TimelineEventType::Archived,
        timestamp,
        format!("{} archived", capitalize(record.kind.as_str())),
    ))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// =============================================================================
// Grouping
// =============================================================================

/// Bucket a sorted event sequence by calendar date (UTC). Buckets follow the
/// sort order (newest group first) and events keep their global order.
fn group_by_date(events: &[TimelineEvent]) -> Vec<TimelineGroup> {
    let today = Utc::now().date_naive();
    let mut groups: Vec<TimelineGroup> = Vec::new();

    for event in events {
        let date = event.timestamp.date_naive();
        match groups.last_mut() {
            Some(group) if group.date == date => group.events.push(event.clone()),
            _ => groups.push(TimelineGroup {
                date,
                label: date_label(date, today),
                events: vec![event.clone()],
            }),
        }
    }

    groups
}

/// Relative label for the two most recent calendar days, absolute for the
/// rest.
fn date_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if Some(date) == today.pred_opt() {
        "Yesterday".to_string()
    } else {
        date.format("%b %-d, %Y").to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Record, RecordKind, RecordStatus};
    use crate::version::{Amendment, HistoryState, VersionSummary};
    use chrono::{Duration, TimeZone, Utc};

    fn record_with_logs() -> Record {
        let now = Utc::now();
        let mut record = Record::new(RecordKind::Culture, "Oyster LC");
        record.created_at = now - Duration::days(10);

        let t1 = now - Duration::hours(5);
        let t2 = now - Duration::hours(2);
        record
            .observations
            .push(Observation::new(ObservationKind::Contamination, t1).with_note("green mold"));
        record.transfers.push(
            TransferEvent::new(TransferDirection::Out, t2)
                .with_counterpart(crate::model::RecordId::new(), RecordKind::Culture),
        );
        record
    }

    #[test]
    fn test_timeline_sorted_descending() {
        let record = record_with_logs();
        let view = TimelineAggregator::new().aggregate(&record, None, &HashSet::new());

        assert_eq!(view.events.len(), 3);
        assert_eq!(view.events[0].event_type, TimelineEventType::TransferOut);
        assert_eq!(view.events[1].event_type, TimelineEventType::Contamination);
        assert_eq!(view.events[2].event_type, TimelineEventType::Created);
        for pair in view.events.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[test]
    fn test_filter_retains_only_selected_types() {
        let record = record_with_logs();
        let filter: HashSet<_> = [TimelineEventType::Contamination].into_iter().collect();
        let view = TimelineAggregator::new().aggregate(&record, None, &filter);

        assert_eq!(view.events.len(), 1);
        assert_eq!(view.events[0].event_type, TimelineEventType::Contamination);
        assert_eq!(view.events[0].description.as_deref(), Some("green mold"));
    }

    #[test]
    fn test_empty_filter_means_no_filtering() {
        let record = record_with_logs();
        let aggregator = TimelineAggregator::new();
        let unfiltered = aggregator.aggregate(&record, None, &HashSet::new());
        assert_eq!(unfiltered.events.len(), 3);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let record = record_with_logs();
        let aggregator = TimelineAggregator::new();
        let filter: HashSet<_> = [TimelineEventType::Contamination, TimelineEventType::Created]
            .into_iter()
            .collect();

        let once = aggregator.aggregate(&record, None, &filter);
        let types: Vec<_> = once.events.iter().map(|e| e.event_type).collect();
        // Re-aggregating with the same filter yields the same sequence.
        let twice = aggregator.aggregate(&record, None, &filter);
        let types_again: Vec<_> = twice.events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, types_again);
    }

    #[test]
    fn test_grouped_timeline_flattens_to_timeline() {
        let record = record_with_logs();
        let view = TimelineAggregator::new().aggregate(&record, None, &HashSet::new());

        let flattened: Vec<_> = view
            .groups
            .iter()
            .flat_map(|g| g.events.iter().map(|e| e.id))
            .collect();
        let direct: Vec<_> = view.events.iter().map(|e| e.id).collect();
        assert_eq!(flattened, direct);

        // Groups are ordered newest first.
        for pair in view.groups.windows(2) {
            assert!(pair[0].date > pair[1].date);
        }
    }

    #[test]
    fn test_date_labels_relative_then_absolute() {
        let now = Utc::now();
        let mut record = Record::new(RecordKind::Culture, "Labels");
        record.created_at = now - Duration::days(30);
        record
            .observations
            .push(Observation::new(ObservationKind::Growth, now));
        record
            .observations
            .push(Observation::new(ObservationKind::Growth, now - Duration::days(1)));

        let view = TimelineAggregator::new().aggregate(&record, None, &HashSet::new());
        assert_eq!(view.groups.len(), 3);
        assert_eq!(view.groups[0].label, "Today");
        assert_eq!(view.groups[1].label, "Yesterday");
        // Older groups get an absolute label.
        assert!(view.groups[2].label.contains(','));
    }

    #[test]
    fn test_absolute_label_format() {
        let date = Utc
            .with_ymd_and_hms(2024, 3, 7, 12, 0, 0)
            .unwrap()
            .date_naive();
        let today = Utc
            .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .unwrap()
            .date_naive();
        assert_eq!(date_label(date, today), "Mar 7, 2024");
    }

    #[test]
    fn test_missing_timestamp_is_dropped_not_fatal() {
        let mut record = record_with_logs();
        record.observations.push(Observation {
            id: uuid::Uuid::new_v4(),
            kind: ObservationKind::Growth,
            timestamp: None,
            note: Some("broken entry".into()),
            stage: None,
        });

        let view = TimelineAggregator::new().aggregate(&record, None, &HashSet::new());
        // The malformed entry is excluded; the rest aggregate normally.
        assert_eq!(view.events.len(), 3);
    }

    #[test]
    fn test_amendments_and_archive_map_into_timeline() {
        let now = Utc::now();
        let mut record = record_with_logs();
        record.status = RecordStatus::Archived;
        record.archived_at = Some(now - Duration::hours(1));

        let history = VersionHistoryView {
            versions: vec![
                VersionSummary {
                    number: 1,
                    is_current: false,
                    valid_from: record.created_at,
                    valid_to: Some(now - Duration::hours(3)),
                    amendment_type: AmendmentType::Original,
                    amendment_reason: None,
                },
                VersionSummary {
                    number: 2,
                    is_current: true,
                    valid_from: now - Duration::hours(3),
                    valid_to: None,
                    amendment_type: AmendmentType::Correction,
                    amendment_reason: Some("fixed species".into()),
                },
            ],
            amendments: vec![
                Amendment {
                    version: 1,
                    amendment_type: AmendmentType::Original,
                    reason: None,
                    at: record.created_at,
                },
                Amendment {
                    version: 2,
                    amendment_type: AmendmentType::Correction,
                    reason: Some("fixed species".into()),
                    at: now - Duration::hours(3),
                },
            ],
            is_archived: true,
            state: HistoryState::Archived,
        };

        let view = TimelineAggregator::new().aggregate(&record, Some(&history), &HashSet::new());
        let types: Vec<_> = view.events.iter().map(|e| e.event_type).collect();

        // The original amendment is folded into the creation event.
        assert_eq!(
            types
                .iter()
                .filter(|t| **t == TimelineEventType::Amendment)
                .count(),
            1
        );
        assert!(types.contains(&TimelineEventType::Archived));
        assert_eq!(types[0], TimelineEventType::Archived);
    }

    #[test]
    fn test_derived_event_ids_stable_across_recomputation() {
        let now = Utc::now();
        let mut record = record_with_logs();
        record.status = RecordStatus::Archived;
        record.archived_at = Some(now - Duration::hours(1));

        let history = VersionHistoryView {
            versions: Vec::new(),
            amendments: vec![Amendment {
                version: 2,
                amendment_type: AmendmentType::Correction,
                reason: None,
                at: now - Duration::hours(3),
            }],
            is_archived: true,
            state: HistoryState::Archived,
        };

        let aggregator = TimelineAggregator::new();
        let first = aggregator.aggregate(&record, Some(&history), &HashSet::new());
        let second = aggregator.aggregate(&record, Some(&history), &HashSet::new());

        let ids = |view: &crate::timeline::TimelineView| {
            view.events
                .iter()
                .filter(|e| {
                    matches!(
                        e.event_type,
                        TimelineEventType::Amendment | TimelineEventType::Archived
                    )
                })
                .map(|e| e.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first).len(), 2);
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_ties_keep_source_order() {
        let ts = Utc::now() - Duration::hours(1);
        let mut record = Record::new(RecordKind::Grow, "Tub");
        record.created_at = ts - Duration::days(1);
        let a = Observation::new(ObservationKind::Growth, ts).with_note("first");
        let b = Observation::new(ObservationKind::Growth, ts).with_note("second");
        let (id_a, id_b) = (a.id, b.id);
        record.observations.push(a);
        record.observations.push(b);

        let view = TimelineAggregator::new().aggregate(&record, None, &HashSet::new());
        assert_eq!(view.events[0].id, id_a);
        assert_eq!(view.events[1].id, id_b);
    }
}
