//! # Sporelog Core
//!
//! The Provenance & History core of the Sporelog cultivation record keeper.
//!
//! ## Architecture
//!
//! - **LineageResolver**: Reconstructs a record's biological lineage (ancestor
//!   chains and descendant sets across transfer-derived copies)
//! - **VersionStore**: Maintains the immutable version/amendment trail for each
//!   record, with point-in-time read and additive restore
//! - **TimelineAggregator**: Merges heterogeneous event sources into one
//!   chronologically ordered, filterable, groupable timeline per record
//! - **Repository traits**: Injected collaborators (`RecordRepository`,
//!   `AmendmentLog`) so every component is testable against fixture data
//! - **Telemetry**: Structured logging via tracing with JSON/pretty formats
//!
//! All three components are read/derive-only projections over the backing
//! store; the single write path is `VersionStore::amend`/`restore_version`,
//! which appends to the amendment log and never edits history in place.

pub mod config;
pub mod error;
pub mod lineage;
pub mod model;
pub mod repository;
pub mod telemetry;
pub mod timeline;
pub mod version;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result, SporelogError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CoreConfig, LineageConfig, ObservabilityConfig};
    pub use crate::error::{
        ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result, SporelogError,
    };
    pub use crate::lineage::{LineageResolver, LineageView, LineageWarning};
    pub use crate::model::{
        FlushEvent, Observation, ObservationKind, Record, RecordId, RecordKind, RecordStatus,
        RecordSummary, TransferDirection, TransferEvent,
    };
    pub use crate::repository::{
        AmendmentLog, InMemoryAmendmentLog, InMemoryRecordRepository, NewAmendment,
        RecordRepository,
    };
    pub use crate::timeline::{
        TimelineAggregator, TimelineEvent, TimelineEventType, TimelineGroup, TimelineView,
    };
    pub use crate::version::{
        Amendment, AmendmentType, HistoryState, Version, VersionHistoryView, VersionStore,
        VersionSummary, VersionedAmendment,
    };
}
