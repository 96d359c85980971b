//! External collaborator traits and in-memory fixture backends.
//!
//! The core never owns persistence. `RecordRepository` and `AmendmentLog`
//! are injected at construction time so lineage/version/timeline logic can
//! be tested in isolation with fixture data, and so embedders can push the
//! descendant scan down to an indexed query instead of a full scan.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::{Record, RecordId, RecordKind};
use crate::version::{Amendment, AmendmentType, Version, VersionedAmendment};

// =============================================================================
// Record Repository
// =============================================================================

/// Keyed lookup of records by id and kind.
///
/// Implementations backed by a real database should push `list_by_parent`
/// down to an indexed query on the parent column rather than a full scan;
/// the core's contract does not require it.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Fetch a single record, `None` if it does not exist.
    async fn get_by_id(&self, kind: RecordKind, id: RecordId) -> Result<Option<Record>>;

    /// All records of `kind` whose `parent_id` equals `parent_id`.
    async fn list_by_parent(&self, kind: RecordKind, parent_id: RecordId) -> Result<Vec<Record>>;

    /// All records of `kind`.
    async fn list_all(&self, kind: RecordKind) -> Result<Vec<Record>>;
}

/// In-memory record repository for tests and embedders without a database.
#[derive(Debug, Default)]
pub struct InMemoryRecordRepository {
    records: DashMap<RecordId, Record>,
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: Record) {
        self.records.insert(record.id, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn get_by_id(&self, kind: RecordKind, id: RecordId) -> Result<Option<Record>> {
        Ok(self
            .records
            .get(&id)
            .filter(|r| r.kind == kind)
            .map(|r| r.clone()))
    }

    async fn list_by_parent(&self, kind: RecordKind, parent_id: RecordId) -> Result<Vec<Record>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.kind == kind && r.parent_id == Some(parent_id))
            .map(|r| r.clone())
            .collect())
    }

    async fn list_all(&self, kind: RecordKind) -> Result<Vec<Record>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.clone())
            .collect())
    }
}

// =============================================================================
// Amendment Log
// =============================================================================

/// Input for appending to the amendment log.
#[derive(Debug, Clone)]
pub struct NewAmendment {
    /// The record group to append to
    pub record_group: RecordId,

    pub amendment_type: AmendmentType,

    /// Optional human reason
    pub reason: Option<String>,

    /// Field state of the new version
    pub fields: serde_json::Value,

    /// Validity start override; `None` means "now". Used when a never-amended
    /// record's synthetic original is first persisted, so its interval starts
    /// at the record's creation time.
    pub valid_from: Option<DateTime<Utc>>,

    /// Version number override for the first entry of a group; `None` means
    /// next in sequence. Lets a materialized original keep the number readers
    /// were already shown when the record's version counter starts above 1.
    pub number: Option<u32>,
}

/// Append-only log of versions and the amendments that produced them.
///
/// `append` must be atomic from a reader's point of view: assigning the next
/// version number, closing the previous version's `valid_to`, and opening
/// the new current version happen as one step.
#[async_trait]
pub trait AmendmentLog: Send + Sync {
    /// All entries for a record group, ordered by version number ascending.
    async fn list_by_record_group(&self, group: RecordId) -> Result<Vec<VersionedAmendment>>;

    /// Append an amendment, producing the new current version.
    async fn append(&self, amendment: NewAmendment) -> Result<Version>;
}

/// In-memory amendment log for tests and embedders without a database.
#[derive(Debug, Default)]
pub struct InMemoryAmendmentLog {
    entries: RwLock<HashMap<RecordId, Vec<VersionedAmendment>>>,
}

impl InMemoryAmendmentLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AmendmentLog for InMemoryAmendmentLog {
    async fn list_by_record_group(&self, group: RecordId) -> Result<Vec<VersionedAmendment>> {
        Ok(self
            .entries
            .read()
            .get(&group)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, amendment: NewAmendment) -> Result<Version> {
        let mut entries = self.entries.write();
        let group_entries = entries.entry(amendment.record_group).or_default();

        let valid_from = amendment.valid_from.unwrap_or_else(Utc::now);
        let number = match group_entries.last() {
            Some(last) => last.version.number + 1,
            None => amendment.number.unwrap_or(1),
        };

        // Close the previous current version at the new version's start,
        // keeping the validity intervals gap- and overlap-free.
        if let Some(last) = group_entries.last_mut() {
            last.version.valid_to = Some(valid_from);
        }

        let version = Version {
            record_group: amendment.record_group,
            number,
            fields: amendment.fields,
            valid_from,
            valid_to: None,
        };

        group_entries.push(VersionedAmendment {
            version: version.clone(),
            amendment: Amendment {
                version: number,
                amendment_type: amendment.amendment_type,
                reason: amendment.reason,
                at: valid_from,
            },
        });

        Ok(version)
    }
}
