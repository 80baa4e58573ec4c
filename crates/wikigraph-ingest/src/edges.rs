//! Relationship accumulation for the `load-edges` stage.
//!
//! Candidates are grouped by the property that links them. Grouping is what
//! makes the bulk statements cheap: every candidate under one property ends up
//! in a single `UNWIND` statement for that relationship type.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use tracing::info;

use crate::batcher::BatchBuffer;
use crate::committer::{CommitReport, Committer};
use crate::error::Result;
use crate::record::{Record, Statement};
use crate::store::GraphStore;

/// One relationship waiting to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationCandidate {
    /// Entity holding the statement.
    pub source_id: String,
    /// Entity the statement points at.
    pub target_id: String,
    /// Qualifier property id -> flat value. Valueless qualifier snaks are
    /// dropped; when several carry a value the last one is kept.
    pub qualifiers: BTreeMap<String, String>,
}

impl RelationCandidate {
    /// Builds a candidate from `statement`, or `None` when its main value is
    /// not an entity reference.
    #[must_use]
    pub fn from_statement(source_id: &str, statement: &Statement) -> Option<Self> {
        let target_id = statement.main_value()?.entity_id()?;

        let mut qualifiers = BTreeMap::new();
        for (property, snaks) in &statement.qualifiers {
            if let Some(value) = snaks.iter().filter_map(|s| s.value.as_ref()).last() {
                qualifiers.insert(property.clone(), value.to_string());
            }
        }

        Some(Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            qualifiers,
        })
    }
}

/// Candidates of one record under one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyCandidates {
    /// Property id.
    pub property: String,
    /// Non-empty candidate list.
    pub candidates: Vec<RelationCandidate>,
}

/// Extracts the candidates of `record`, ordered by property id.
///
/// Properties without any entity-valued statement are left out.
#[must_use]
pub fn candidates_from_record(record: &Record) -> Vec<PropertyCandidates> {
    let mut grouped: Vec<PropertyCandidates> = record
        .claims
        .iter()
        .filter_map(|(property, statements)| {
            let candidates: Vec<RelationCandidate> = statements
                .iter()
                .filter_map(|s| RelationCandidate::from_statement(&record.id, s))
                .collect();
            (!candidates.is_empty()).then(|| PropertyCandidates {
                property: property.clone(),
                candidates,
            })
        })
        .collect();
    grouped.sort_by(|a, b| a.property.cmp(&b.property));
    grouped
}

/// Property id -> candidates gathered since the last flush.
pub type PendingBatch = BTreeMap<String, Vec<RelationCandidate>>;

/// Totals of one `load-edges` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeReport {
    /// Relationships written.
    pub relationships_written: u64,
    /// Batches committed.
    pub flushes: u64,
    /// Properties skipped because their label could not be resolved.
    pub skipped_properties: u64,
    /// Bulk statements the store rejected.
    pub failed_statements: u64,
}

impl EdgeReport {
    fn absorb(&mut self, commit: CommitReport) {
        self.relationships_written += commit.relationships_written;
        self.skipped_properties += commit.skipped_properties;
        self.failed_statements += commit.failed_statements;
        self.flushes += 1;
    }
}

/// Accumulates candidates until `threshold` distinct properties are pending,
/// then hands the whole batch to the [`Committer`].
pub struct EdgeAccumulator {
    pending: PendingBatch,
    threshold: usize,
    committer: Committer,
    report: EdgeReport,
}

impl EdgeAccumulator {
    /// Creates an accumulator committing through `store`.
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>, threshold: usize) -> Self {
        Self {
            pending: PendingBatch::new(),
            threshold: threshold.max(1),
            committer: Committer::new(store),
            report: EdgeReport::default(),
        }
    }

    /// Number of distinct properties pending.
    #[must_use]
    pub fn pending_properties(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl BatchBuffer for EdgeAccumulator {
    type Item = PropertyCandidates;
    type Report = EdgeReport;

    fn push(&mut self, item: PropertyCandidates) {
        self.pending
            .entry(item.property)
            .or_default()
            .extend(item.candidates);
    }

    fn is_full(&self) -> bool {
        self.pending.len() >= self.threshold
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    async fn flush(&mut self) -> Result<()> {
        let batch = mem::take(&mut self.pending);
        let properties = batch.len();
        let commit = self.committer.commit(batch).await?;
        self.report.absorb(commit);
        info!(
            "Committed {} relationships over {} properties ({} total)",
            commit.relationships_written, properties, self.report.relationships_written
        );
        Ok(())
    }

    fn into_report(self) -> EdgeReport {
        self.report
    }
}
