//! Node batch writer for the `load-nodes` stage.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::batcher::BatchBuffer;
use crate::error::Result;
use crate::record::{EntityKind, Record};
use crate::store::{GraphStore, NodeRow};

/// A record reduced to the node it becomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    /// Entity kind; picks the buffer and the kind label.
    pub kind: EntityKind,
    /// Node properties.
    pub row: NodeRow,
}

impl NodeEntry {
    /// Takes the label and description in `locale` out of `record`.
    #[must_use]
    pub fn from_record(record: Record, locale: &str) -> Self {
        let label = record.label(locale).map(str::to_string);
        let description = record.description(locale).map(str::to_string);
        Self {
            kind: record.kind,
            row: NodeRow {
                id: record.id,
                page_id: record.page_id,
                label,
                description,
            },
        }
    }
}

/// Totals of one `load-nodes` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeReport {
    /// Item and Property nodes written.
    pub nodes_written: u64,
    /// Flush transactions committed.
    pub flushes: u64,
    /// MediaInfo records seen and not written.
    pub skipped_media_info: u64,
}

/// Fixed-capacity Item and Property buffers written together.
///
/// When either buffer reaches capacity both are upserted in one transaction
/// and emptied.
pub struct NodeBatchWriter {
    store: Arc<dyn GraphStore>,
    capacity: usize,
    items: Vec<NodeRow>,
    properties: Vec<NodeRow>,
    report: NodeReport,
}

impl NodeBatchWriter {
    /// Creates a writer holding at most `capacity` rows per kind.
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            store,
            capacity,
            items: Vec::with_capacity(capacity),
            properties: Vec::with_capacity(capacity),
            report: NodeReport::default(),
        }
    }
}

#[async_trait]
impl BatchBuffer for NodeBatchWriter {
    type Item = NodeEntry;
    type Report = NodeReport;

    fn push(&mut self, entry: NodeEntry) {
        match entry.kind {
            EntityKind::Item => self.items.push(entry.row),
            EntityKind::Property => self.properties.push(entry.row),
            EntityKind::MediaInfo => self.report.skipped_media_info += 1,
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity || self.properties.len() >= self.capacity
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty() && self.properties.is_empty()
    }

    async fn flush(&mut self) -> Result<()> {
        let written = (self.items.len() + self.properties.len()) as u64;
        debug!(
            "Flushing {} items and {} properties",
            self.items.len(),
            self.properties.len()
        );

        let mut tx = self.store.begin().await?;
        let written_ok = async {
            tx.upsert_nodes(EntityKind::Item.label(), &self.items).await?;
            tx.upsert_nodes(EntityKind::Property.label(), &self.properties)
                .await
        }
        .await;
        if let Err(e) = written_ok {
            // Best effort: the stage fails with the statement error either way.
            let _ = tx.rollback().await;
            return Err(e);
        }
        tx.commit().await?;

        self.items.clear();
        self.properties.clear();
        self.report.nodes_written += written;
        self.report.flushes += 1;
        info!(
            "Committed {} nodes ({} total)",
            written, self.report.nodes_written
        );
        Ok(())
    }

    fn into_report(self) -> NodeReport {
        self.report
    }
}
