//! The version store: ordered history, point-in-time reads, additive restore.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::{Result, SporelogError};
use crate::model::{Record, RecordId};
use crate::repository::{AmendmentLog, NewAmendment};
use crate::version::{
    AmendmentType, HistoryState, Version, VersionHistoryView, VersionSummary,
};

/// Maintains the ordered, non-destructive history of a record's field states.
///
/// All operations take the record itself so archived status is read from the
/// externally-owned entity. Writes are serialized per record group: two
/// concurrent restores on the same group cannot both open a current version.
/// Conflict policy: callers that pass an expected current version get
/// compare-and-set rejection on mismatch; callers that pass `None` get
/// serialized last-writer-wins. Either way every amendment is durably
/// recorded — the log is append-only.
pub struct VersionStore {
    log: Arc<dyn AmendmentLog>,

    /// Per-group write locks, created lazily
    group_locks: DashMap<RecordId, Arc<Mutex<()>>>,
}

impl VersionStore {
    pub fn new(log: Arc<dyn AmendmentLog>) -> Self {
        Self {
            log,
            group_locks: DashMap::new(),
        }
    }

    fn group_lock(&self, group: RecordId) -> Arc<Mutex<()>> {
        self.group_locks
            .entry(group)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The version number of the synthetic original for a never-amended record.
    fn synthetic_number(record: &Record) -> u32 {
        record.version.max(1)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Produce the ordered version/amendment history for a record.
    ///
    /// A record that was never amended yields a single synthetic original
    /// version built from the record's own `created_at`/`version` fields:
    /// the absence of history is a valid, displayable state, never "no data".
    #[instrument(skip(self, record), fields(record_group = %record.id))]
    pub async fn history(&self, record: &Record) -> Result<VersionHistoryView> {
        let entries = self.log.list_by_record_group(record.id).await?;

        let state = if record.status.is_archived() {
            HistoryState::Archived
        } else if entries.len() >= 2 {
            HistoryState::Amended
        } else {
            HistoryState::NoHistory
        };

        if entries.is_empty() {
            return Ok(VersionHistoryView {
                versions: vec![VersionSummary {
                    number: Self::synthetic_number(record),
                    is_current: true,
                    valid_from: record.created_at,
                    valid_to: None,
                    amendment_type: AmendmentType::Original,
                    amendment_reason: None,
                }],
                amendments: Vec::new(),
                is_archived: record.status.is_archived(),
                state,
            });
        }

        let versions = entries
            .iter()
            .map(|e| VersionSummary {
                number: e.version.number,
                is_current: e.version.is_current(),
                valid_from: e.version.valid_from,
                valid_to: e.version.valid_to,
                amendment_type: e.amendment.amendment_type,
                amendment_reason: e.amendment.reason.clone(),
            })
            .collect();
        let amendments = entries.iter().map(|e| e.amendment.clone()).collect();

        Ok(VersionHistoryView {
            versions,
            amendments,
            is_archived: record.status.is_archived(),
            state,
        })
    }

    /// Read-only point-in-time projection of the record's fields at a version.
    ///
    /// An unknown version number is reported as not found, never silently
    /// substituted with the current version.
    #[instrument(skip(self, record), fields(record_group = %record.id))]
    pub async fn view_version(&self, record: &Record, number: u32) -> Result<Version> {
        let entries = self.log.list_by_record_group(record.id).await?;

        if entries.is_empty() {
            if number == Self::synthetic_number(record) {
                return Ok(Version {
                    record_group: record.id,
                    number,
                    fields: record.fields.clone(),
                    valid_from: record.created_at,
                    valid_to: None,
                });
            }
            return Err(SporelogError::version_not_found(
                record.id.to_string(),
                number,
            ));
        }

        entries
            .into_iter()
            .find(|e| e.version.number == number)
            .map(|e| e.version)
            .ok_or_else(|| SporelogError::version_not_found(record.id.to_string(), number))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a correction: close the current version and open a new one with
    /// the given fields.
    ///
    /// The first amendment migrates a no-history group by persisting the
    /// synthetic original before appending, so version numbers and validity
    /// intervals stay total.
    #[instrument(skip(self, record, fields), fields(record_group = %record.id))]
    pub async fn amend(
        &self,
        record: &Record,
        fields: serde_json::Value,
        reason: Option<String>,
    ) -> Result<Version> {
        if record.status.is_archived() {
            return Err(SporelogError::record_archived(record.id.to_string()));
        }

        let lock = self.group_lock(record.id);
        let _guard = lock.lock().await;

        self.materialize_original(record).await?;

        let version = self
            .log
            .append(NewAmendment {
                record_group: record.id,
                amendment_type: AmendmentType::Correction,
                reason,
                fields,
                valid_from: None,
                number: None,
            })
            .await?;

        tracing::debug!(
            record_group = %record.id,
            version = version.number,
            "Amendment recorded"
        );

        Ok(version)
    }

    /// Restore a historical version's fields as a new current version.
    ///
    /// Restore is additive: it appends a new version whose fields equal the
    /// historical snapshot and never mutates or removes the restored version.
    /// If `expected_current` is supplied and the group's current version
    /// number differs, the restore is rejected with a conflict error.
    #[instrument(skip(self, record), fields(record_group = %record.id))]
    pub async fn restore_version(
        &self,
        record: &Record,
        number: u32,
        expected_current: Option<u32>,
    ) -> Result<Version> {
        if record.status.is_archived() {
            return Err(SporelogError::record_archived(record.id.to_string()));
        }

        let lock = self.group_lock(record.id);
        let _guard = lock.lock().await;

        self.materialize_original(record).await?;
        let entries = self.log.list_by_record_group(record.id).await?;

        let target = entries
            .iter()
            .find(|e| e.version.number == number)
            .ok_or_else(|| SporelogError::version_not_found(record.id.to_string(), number))?;

        if let Some(expected) = expected_current {
            // The last entry is the current version: the log appends in order.
            let current = entries.last().map(|e| e.version.number).unwrap_or(0);
            if current != expected {
                return Err(SporelogError::version_conflict(expected, current));
            }
        }

        let fields = target.version.fields.clone();
        let reason = Some(format!("Restored from version {}", number));

        let version = self
            .log
            .append(NewAmendment {
                record_group: record.id,
                amendment_type: AmendmentType::Restore,
                reason,
                fields,
                valid_from: None,
                number: None,
            })
            .await?;

        tracing::info!(
            record_group = %record.id,
            restored_from = number,
            new_version = version.number,
            "Version restored"
        );

        Ok(version)
    }

    /// Persist the synthetic original for a group whose log is still empty.
    /// Must be called with the group lock held.
    async fn materialize_original(&self, record: &Record) -> Result<()> {
        let entries = self.log.list_by_record_group(record.id).await?;
        if entries.is_empty() {
            self.log
                .append(NewAmendment {
                    record_group: record.id,
                    amendment_type: AmendmentType::Original,
                    reason: None,
                    fields: record.fields.clone(),
                    valid_from: Some(record.created_at),
                    number: Some(Self::synthetic_number(record)),
                })
                .await?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Record, RecordKind, RecordStatus};
    use crate::repository::InMemoryAmendmentLog;
    use chrono::Utc;

    fn store() -> VersionStore {
        VersionStore::new(Arc::new(InMemoryAmendmentLog::new()))
    }

    fn culture(fields: serde_json::Value) -> Record {
        let mut record = Record::new(RecordKind::Culture, "Oyster LC");
        record.fields = fields;
        record
    }

    #[tokio::test]
    async fn test_no_history_synthesizes_single_original() {
        let store = store();
        let record = culture(serde_json::json!({"medium": "agar"}));

        let view = store.history(&record).await.unwrap();
        assert_eq!(view.state, HistoryState::NoHistory);
        assert_eq!(view.versions.len(), 1);
        assert_eq!(view.versions[0].number, 1);
        assert!(view.versions[0].is_current);
        assert_eq!(view.versions[0].valid_from, record.created_at);
        assert!(view.amendments.is_empty());
        assert!(!view.is_archived);
    }

    #[tokio::test]
    async fn test_amend_twice_yields_three_versions() {
        let store = store();
        let record = culture(serde_json::json!({"medium": "agar"}));

        store
            .amend(&record, serde_json::json!({"medium": "lc"}), None)
            .await
            .unwrap();
        store
            .amend(
                &record,
                serde_json::json!({"medium": "grain"}),
                Some("moved to grain".into()),
            )
            .await
            .unwrap();

        let view = store.history(&record).await.unwrap();
        assert_eq!(view.state, HistoryState::Amended);
        assert_eq!(view.versions.len(), 3);
        assert!(view.versions[0].valid_to.is_some());
        assert!(view.versions[1].valid_to.is_some());
        assert!(view.versions[2].valid_to.is_none());
        assert_eq!(view.current().unwrap().number, 3);

        // Exactly one open interval per group.
        let open = view.versions.iter().filter(|v| v.is_current).count();
        assert_eq!(open, 1);
    }

    #[tokio::test]
    async fn test_validity_intervals_partition_lifetime() {
        let store = store();
        let record = culture(serde_json::json!({"n": 0}));

        for i in 1..=3 {
            store
                .amend(&record, serde_json::json!({ "n": i }), None)
                .await
                .unwrap();
        }

        let view = store.history(&record).await.unwrap();
        assert_eq!(view.versions[0].valid_from, record.created_at);
        for pair in view.versions.windows(2) {
            assert_eq!(pair[0].valid_to, Some(pair[1].valid_from));
        }
    }

    #[tokio::test]
    async fn test_restore_is_additive() {
        let store = store();
        let record = culture(serde_json::json!({"medium": "agar"}));

        store
            .amend(&record, serde_json::json!({"medium": "lc"}), None)
            .await
            .unwrap();
        store
            .amend(&record, serde_json::json!({"medium": "grain"}), None)
            .await
            .unwrap();

        let snapshot = store.view_version(&record, 1).await.unwrap();
        let restored = store.restore_version(&record, 1, None).await.unwrap();

        assert_eq!(restored.number, 4);
        assert_eq!(restored.fields, snapshot.fields);

        // Versions 1-3 are unchanged; only the count grew by one.
        let view = store.history(&record).await.unwrap();
        assert_eq!(view.versions.len(), 4);
        let v1 = store.view_version(&record, 1).await.unwrap();
        assert_eq!(v1.fields, serde_json::json!({"medium": "agar"}));
        assert_eq!(view.versions[3].amendment_type, AmendmentType::Restore);
    }

    #[tokio::test]
    async fn test_view_version_unknown_is_not_found() {
        let store = store();
        let record = culture(serde_json::json!({}));

        let err = store.view_version(&record, 7).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::VersionNotFound);
    }

    #[tokio::test]
    async fn test_restore_on_archived_record_is_rejected() {
        let store = store();
        let mut record = culture(serde_json::json!({}));
        store
            .amend(&record, serde_json::json!({"x": 1}), None)
            .await
            .unwrap();
        record.status = RecordStatus::Archived;
        record.archived_at = Some(Utc::now());

        let err = store.restore_version(&record, 1, None).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::RecordArchived);

        let err = store
            .amend(&record, serde_json::json!({"x": 2}), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::RecordArchived);

        // No partial state change: still two versions.
        let view = store.history(&record).await.unwrap();
        assert_eq!(view.versions.len(), 2);
        assert_eq!(view.state, HistoryState::Archived);
        assert!(view.is_archived);
    }

    #[tokio::test]
    async fn test_restore_with_stale_expected_current_conflicts() {
        let store = store();
        let record = culture(serde_json::json!({"x": 0}));

        store
            .amend(&record, serde_json::json!({"x": 1}), None)
            .await
            .unwrap();
        store
            .amend(&record, serde_json::json!({"x": 2}), None)
            .await
            .unwrap();

        // A reader that still believes version 2 is current loses the race.
        let err = store
            .restore_version(&record, 1, Some(2))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::VersionConflict);

        // The matching expectation succeeds.
        let restored = store.restore_version(&record, 1, Some(3)).await.unwrap();
        assert_eq!(restored.number, 4);
    }

    #[tokio::test]
    async fn test_materialized_original_keeps_displayed_number() {
        let store = store();
        let mut record = culture(serde_json::json!({"medium": "agar"}));
        record.version = 3;

        // Readers were shown synthetic version 3 before any amendment.
        let view = store.history(&record).await.unwrap();
        assert_eq!(view.versions[0].number, 3);

        store
            .amend(&record, serde_json::json!({"medium": "lc"}), None)
            .await
            .unwrap();

        // The first write must not renumber what was already displayed.
        let view = store.history(&record).await.unwrap();
        assert_eq!(view.versions[0].number, 3);
        assert_eq!(view.versions[1].number, 4);

        let original = store.view_version(&record, 3).await.unwrap();
        assert_eq!(original.fields, serde_json::json!({"medium": "agar"}));
    }

    #[tokio::test]
    async fn test_restore_synthetic_original_of_unamended_record() {
        let store = store();
        let record = culture(serde_json::json!({"medium": "agar"}));

        let restored = store.restore_version(&record, 1, None).await.unwrap();
        assert_eq!(restored.number, 2);
        assert_eq!(restored.fields, serde_json::json!({"medium": "agar"}));
    }

    #[tokio::test]
    async fn test_concurrent_restores_serialize() {
        let store = Arc::new(store());
        let record = culture(serde_json::json!({"x": 0}));

        store
            .amend(&record, serde_json::json!({"x": 1}), None)
            .await
            .unwrap();

        let a = {
            let store = store.clone();
            let record = record.clone();
            tokio::spawn(async move { store.restore_version(&record, 1, None).await })
        };
        let b = {
            let store = store.clone();
            let record = record.clone();
            tokio::spawn(async move { store.restore_version(&record, 1, None).await })
        };

        let va = a.await.unwrap().unwrap();
        let vb = b.await.unwrap().unwrap();

        // Both amendments are durably recorded with distinct numbers; the
        // later one deterministically supersedes the earlier as current.
        assert_ne!(va.number, vb.number);
        let view = store.history(&record).await.unwrap();
        assert_eq!(view.versions.len(), 4);
        assert_eq!(view.versions.iter().filter(|v| v.is_current).count(), 1);
    }
}
