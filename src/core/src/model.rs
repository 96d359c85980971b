//! Domain model for versionable, lineage-bearing records.
//!
//! A `Record` is a Culture or a Grow owned by the backing store; the core
//! only reads it. The free-form, amendable state lives in the JSON `fields`
//! payload, while the embedded sub-logs (observations, transfers, flushes)
//! are typed so the timeline can map them without consulting the store again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a record (also identifies its version group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of a record. Lineage edges may cross kinds: a grow is
/// typically derived from a culture by transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Culture,
    Grow,
}

impl RecordKind {
    /// All kinds, in scan order for cross-kind lineage queries.
    pub const ALL: [RecordKind; 2] = [RecordKind::Culture, RecordKind::Grow];

    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Culture => "culture",
            RecordKind::Grow => "grow",
        }
    }

    /// The other kind (a parent or child may live on either side).
    pub const fn other(&self) -> RecordKind {
        match self {
            RecordKind::Culture => RecordKind::Grow,
            RecordKind::Grow => RecordKind::Culture,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Record Status
// =============================================================================

/// Lifecycle status of a record.
///
/// Records are never hard-deleted; `Archived` is a terminal status, not a
/// removal. No new versions may be created for an archived record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Contaminated,
    Archived,
}

impl RecordStatus {
    pub const fn is_archived(&self) -> bool {
        matches!(self, RecordStatus::Archived)
    }
}

// =============================================================================
// Record
// =============================================================================

/// A versionable, lineage-bearing entity (a Culture or a Grow).
///
/// The core treats records as read-only snapshots materialized by the
/// backing store. Mutations happen exclusively through the version store,
/// which appends to the amendment log rather than editing in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier (doubles as the version group id)
    pub id: RecordId,

    /// Culture or Grow
    pub kind: RecordKind,

    /// Human-readable name (strain, batch label, ...)
    pub name: String,

    /// The record this one was derived from via transfer, if any.
    /// Set at creation time and immutable thereafter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RecordId>,

    /// Displayed distance from the biological origin. Read, never
    /// recomputed; the lineage resolver flags inconsistencies.
    pub generation: u32,

    /// Lifecycle status
    pub status: RecordStatus,

    /// Current version counter as known to the backing store.
    /// Used to synthesize history for records that were never amended.
    pub version: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the record was archived, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,

    /// Free-form amendable field state (species, substrate, container, ...)
    #[serde(default)]
    pub fields: serde_json::Value,

    /// Observation log embedded in the record
    #[serde(default)]
    pub observations: Vec<Observation>,

    /// Transfer log embedded in the record
    #[serde(default)]
    pub transfers: Vec<TransferEvent>,

    /// Harvest/flush log embedded in the record
    #[serde(default)]
    pub flushes: Vec<FlushEvent>,
}

impl Record {
    /// Create a new record with defaulted logs and fields.
    pub fn new(kind: RecordKind, name: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            kind,
            name: name.into(),
            parent_id: None,
            generation: 0,
            status: RecordStatus::Active,
            version: 1,
            created_at: Utc::now(),
            archived_at: None,
            fields: serde_json::Value::Null,
            observations: Vec::new(),
            transfers: Vec::new(),
            flushes: Vec::new(),
        }
    }

    /// Derive a child record from this one (transfer), one generation down.
    pub fn derive(&self, kind: RecordKind, name: impl Into<String>) -> Self {
        let mut child = Self::new(kind, name);
        child.parent_id = Some(self.id);
        child.generation = self.generation + 1;
        child
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id,
            kind: self.kind,
            name: self.name.clone(),
            generation: self.generation,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Serializable projection of a record for lineage views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: RecordId,
    pub kind: RecordKind,
    pub name: String,
    pub generation: u32,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Embedded Sub-Logs
// =============================================================================

/// Subtype of an observation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Growth,
    Contamination,
    StageChange,
    Note,
}

/// A logged observation on a record.
///
/// `timestamp` is optional on purpose: malformed or missing timestamps in
/// upstream data must survive deserialization so the timeline can drop the
/// entry with a warning instead of failing the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    pub kind: ObservationKind,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// For stage changes: the stage the record moved to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl Observation {
    pub fn new(kind: ObservationKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Some(timestamp),
            note: None,
            stage: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

/// Direction of a transfer relative to the record it is logged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    In,
    Out,
}

/// A logged transfer event (the operation that establishes lineage edges).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub id: Uuid,
    pub direction: TransferDirection,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// The record on the other end of the transfer, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_kind: Option<RecordKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TransferEvent {
    pub fn new(direction: TransferDirection, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            timestamp: Some(timestamp),
            counterpart: None,
            counterpart_kind: None,
            note: None,
        }
    }

    pub fn with_counterpart(mut self, id: RecordId, kind: RecordKind) -> Self {
        self.counterpart = Some(id);
        self.counterpart_kind = Some(kind);
        self
    }
}

/// A logged harvest/flush event on a grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushEvent {
    pub id: Uuid,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yield_grams: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl FlushEvent {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Some(timestamp),
            yield_grams: None,
            note: None,
        }
    }
}
