//! Lineage resolution: ancestor chains and descendant sets.
//!
//! This module handles:
//! - Ancestor walks over parent pointers, bounded against undetected cycles
//! - Direct-children queries and transitive descendant counts
//! - Data-quality warnings (generation mismatches, dangling references)
//!
//! Resolution is pure read/derive: repository failures degrade to partial
//! results and warnings, never to errors past the component boundary — the
//! lineage view must always render something.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, NodeFiltered};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;

use crate::error::{Result, SporelogError};
use crate::model::{Record, RecordId, RecordKind, RecordSummary};
use crate::repository::RecordRepository;

/// Ancestor walks stop after this many steps. Guards against undetected
/// cycles in parent-pointer data without blocking the consuming UI.
pub const DEFAULT_MAX_ANCESTOR_DEPTH: usize = 10;

// =============================================================================
// Views & Warnings
// =============================================================================

/// Read-only, serializable lineage projection exposed to the presentation
/// layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageView {
    /// The record the view was computed for
    pub record: RecordSummary,

    /// Ancestor chain, oldest first; the last element is the direct parent
    pub ancestors: Vec<RecordSummary>,

    /// Direct children (transfer-derived copies of this record)
    pub descendants: Vec<RecordSummary>,

    /// Count of all transitively reachable descendants
    pub descendant_total: usize,

    /// Displayed generation, read from the record (never recomputed)
    pub generation: u32,

    /// Data-quality warnings surfaced during resolution
    pub warnings: Vec<LineageWarning>,
}

/// Non-fatal data-quality findings attached to a lineage view.
///
/// The UI may render these; computation always completes regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineageWarning {
    /// A parent pointer references a record that cannot be resolved
    DanglingParent { parent_id: RecordId },

    /// The ancestor walk hit the depth guard; likely a cycle in the data
    AncestryTruncated { depth: usize },

    /// The parent-pointer graph contains a cycle
    CycleDetected,

    /// A record's generation is inconsistent with its resolved parent
    GenerationMismatch {
        record: RecordId,
        expected: u32,
        actual: u32,
    },
}

// =============================================================================
// Resolver
// =============================================================================

/// Computes ancestor chains and descendant sets for a record.
pub struct LineageResolver {
    repository: Arc<dyn RecordRepository>,
    max_ancestor_depth: usize,
}

impl LineageResolver {
    pub fn new(repository: Arc<dyn RecordRepository>) -> Self {
        Self {
            repository,
            max_ancestor_depth: DEFAULT_MAX_ANCESTOR_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_ancestor_depth = depth;
        self
    }

    /// Resolve the full lineage view for a record.
    ///
    /// Fails only if the record itself cannot be found; everything beyond
    /// that degrades to a partial view plus warnings.
    #[instrument(skip(self), fields(kind = %kind, record = %id))]
    pub async fn resolve(&self, kind: RecordKind, id: RecordId) -> Result<LineageView> {
        let record = self
            .repository
            .get_by_id(kind, id)
            .await?
            .ok_or_else(|| SporelogError::record_not_found(kind.as_str(), id.to_string()))?;

        let mut warnings = Vec::new();
        let ancestors = self.walk_ancestors(&record, &mut warnings).await;
        self.check_generations(&ancestors, &record, &mut warnings);

        let descendants = self.direct_children(record.id).await;
        let descendant_total = self.count_descendants(record.id, &mut warnings).await;

        Ok(LineageView {
            record: record.summary(),
            generation: record.generation,
            ancestors: ancestors.iter().map(Record::summary).collect(),
            descendants,
            descendant_total,
            warnings,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ancestors
    // ─────────────────────────────────────────────────────────────────────────

    /// Walk parent pointers upward, returning the chain oldest first.
    ///
    /// Stops on a missing parent pointer (complete chain), an unresolvable
    /// parent (partial chain, dangling reference is not fatal), or the depth
    /// guard (truncated chain, treated as success).
    async fn walk_ancestors(
        &self,
        record: &Record,
        warnings: &mut Vec<LineageWarning>,
    ) -> Vec<Record> {
        let mut chain = Vec::new();
        let mut next = record.parent_id;

        while let Some(parent_id) = next {
            if chain.len() >= self.max_ancestor_depth {
                tracing::warn!(
                    record = %record.id,
                    depth = self.max_ancestor_depth,
                    "Ancestor walk truncated at depth guard; parent data may contain a cycle"
                );
                warnings.push(LineageWarning::AncestryTruncated {
                    depth: self.max_ancestor_depth,
                });
                break;
            }

            match self.lookup_any_kind(parent_id).await {
                Some(parent) => {
                    next = parent.parent_id;
                    chain.push(parent);
                }
                None => {
                    tracing::warn!(
                        record = %record.id,
                        parent = %parent_id,
                        "Dangling parent reference; returning partial ancestor chain"
                    );
                    warnings.push(LineageWarning::DanglingParent { parent_id });
                    break;
                }
            }
        }

        chain.reverse();
        chain
    }

    /// Resolve a record by id regardless of kind. Lineage edges may cross
    /// kinds (a grow's parent is a culture). Repository errors are caught and
    /// treated as "not resolved".
    async fn lookup_any_kind(&self, id: RecordId) -> Option<Record> {
        for kind in RecordKind::ALL {
            match self.repository.get_by_id(kind, id).await {
                Ok(Some(record)) => return Some(record),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        record = %id,
                        kind = %kind,
                        error = %e,
                        "Repository lookup failed; treating parent as unresolved"
                    );
                }
            }
        }
        None
    }

    /// Flag generation values inconsistent with the resolved chain.
    ///
    /// Generation is display data owned by the backing store; mismatches are
    /// surfaced as warnings and never silently corrected. Two checks: every
    /// child must be one generation below its parent, and on a fully
    /// resolved chain the root must sit at generation zero. The root check
    /// is skipped for partial chains (dangling parent or depth truncation),
    /// where the true root was never reached.
    fn check_generations(
        &self,
        ancestors: &[Record],
        record: &Record,
        warnings: &mut Vec<LineageWarning>,
    ) {
        let mut chain: Vec<&Record> = ancestors.iter().collect();
        chain.push(record);

        let complete = !warnings.iter().any(|w| {
            matches!(
                w,
                LineageWarning::DanglingParent { .. } | LineageWarning::AncestryTruncated { .. }
            )
        });
        if complete {
            let root = chain[0];
            if root.generation != 0 {
                tracing::warn!(
                    record = %root.id,
                    actual = root.generation,
                    "Chain root generation is nonzero; generation inconsistent with chain length"
                );
                warnings.push(LineageWarning::GenerationMismatch {
                    record: root.id,
                    expected: 0,
                    actual: root.generation,
                });
            }
        }

        for pair in chain.windows(2) {
            let (parent, child) = (pair[0], pair[1]);
            let expected = parent.generation + 1;
            if child.generation != expected {
                tracing::warn!(
                    record = %child.id,
                    expected,
                    actual = child.generation,
                    "Generation inconsistent with parent chain"
                );
                warnings.push(LineageWarning::GenerationMismatch {
                    record: child.id,
                    expected,
                    actual: child.generation,
                });
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Descendants
    // ─────────────────────────────────────────────────────────────────────────

    /// Direct children across both kinds, deduplicated, ordered by creation
    /// time for stable display.
    async fn direct_children(&self, id: RecordId) -> Vec<RecordSummary> {
        let mut seen = HashSet::new();
        let mut children = Vec::new();

        for kind in RecordKind::ALL {
            match self.repository.list_by_parent(kind, id).await {
                Ok(records) => {
                    for record in records {
                        if seen.insert(record.id) {
                            children.push(record.summary());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        record = %id,
                        kind = %kind,
                        error = %e,
                        "Child scan failed; descendant list may be partial"
                    );
                }
            }
        }

        children.sort_by_key(|c| c.created_at);
        children
    }

    /// Count every record reachable from `id` by following parent pointers
    /// backward (child edges forward).
    ///
    /// Builds a parent-pointer graph from a full scan and BFS-walks it; the
    /// visit set makes the walk terminate even on cyclic data, which is
    /// additionally surfaced as a warning.
    async fn count_descendants(&self, id: RecordId, warnings: &mut Vec<LineageWarning>) -> usize {
        let mut graph: DiGraph<RecordId, ()> = DiGraph::new();
        let mut nodes: HashMap<RecordId, NodeIndex> = HashMap::new();
        let mut parents: Vec<(RecordId, RecordId)> = Vec::new();

        for kind in RecordKind::ALL {
            match self.repository.list_all(kind).await {
                Ok(records) => {
                    for record in records {
                        nodes
                            .entry(record.id)
                            .or_insert_with(|| graph.add_node(record.id));
                        if let Some(parent_id) = record.parent_id {
                            parents.push((parent_id, record.id));
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        kind = %kind,
                        error = %e,
                        "Full scan failed; descendant count may be partial"
                    );
                }
            }
        }

        for (parent_id, child_id) in parents {
            if let (Some(&p), Some(&c)) = (nodes.get(&parent_id), nodes.get(&child_id)) {
                graph.add_edge(p, c, ());
            }
        }

        let Some(&start) = nodes.get(&id) else {
            return 0;
        };

        let mut reached = HashSet::new();
        let mut bfs = Bfs::new(&graph, start);
        while let Some(node) = bfs.next(&graph) {
            reached.insert(node);
        }

        // Only a cycle the record can actually reach taints its view; an
        // unrelated cyclic component elsewhere in the store does not.
        let component = NodeFiltered::from_fn(&graph, |n| reached.contains(&n));
        if is_cyclic_directed(&component) {
            tracing::warn!(record = %id, "Parent-pointer graph contains a cycle");
            warnings.push(LineageWarning::CycleDetected);
        }

        reached.len() - 1
    }
}

// =============================================================================
// Tests
// =============================================================================
