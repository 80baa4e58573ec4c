//! Commits one pending edge batch in a single transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::edges::{PendingBatch, RelationCandidate};
use crate::error::Result;
use crate::resolver::PropertyLabelResolver;
use crate::store::{GraphStore, GraphTransaction, RelationshipRow};

/// Outcome of one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Relationships carried by the statements that succeeded.
    pub relationships_written: u64,
    /// Properties skipped because their label could not be resolved.
    pub skipped_properties: u64,
    /// Bulk statements the store rejected.
    pub failed_statements: u64,
}

/// One bulk relationship statement.
struct BulkStatement {
    rel_type: String,
    rows: Vec<RelationshipRow>,
}

impl BulkStatement {
    async fn run(&self, tx: &mut dyn GraphTransaction) -> Result<()> {
        tx.upsert_relationships(&self.rel_type, &self.rows).await
    }
}

/// Writes edge batches, resolving property ids to relationship types.
///
/// Holds the label cache for the whole stage run.
pub struct Committer {
    store: Arc<dyn GraphStore>,
    resolver: PropertyLabelResolver,
}

impl Committer {
    /// Creates a committer with an empty label cache.
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            resolver: PropertyLabelResolver::new(),
        }
    }

    /// Writes `batch` in one transaction, one bulk statement per property.
    ///
    /// Unresolvable properties and rejected statements are logged and
    /// counted; the rest of the batch still commits. A rejected statement
    /// fails its whole transaction, so the committer rolls back, replays the
    /// statements that succeeded in a fresh transaction, and retries the
    /// rejected one there once before giving up on it.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction cannot be opened or committed, or
    /// if replaying accepted statements fails.
    pub async fn commit(&mut self, batch: PendingBatch) -> Result<CommitReport> {
        let mut report = CommitReport::default();
        let mut applied: Vec<BulkStatement> = Vec::new();
        let mut tx = self.store.begin().await?;

        for (property, candidates) in batch {
            let resolution = self.resolver.resolve(tx.as_mut(), &property).await;
            if !resolution.resolved {
                warn!(
                    "No label for property {}, skipping {} relationships",
                    property,
                    candidates.len()
                );
                report.skipped_properties += 1;
                continue;
            }

            let mut rows = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                rows.push(self.row(tx.as_mut(), candidate).await);
            }
            let statement = BulkStatement {
                rel_type: resolution.token,
                rows,
            };

            let outcome = statement.run(tx.as_mut()).await;
            if let Err(first) = outcome {
                debug!(
                    "Statement for {} failed, retrying in a fresh transaction: {}",
                    property, first
                );
                tx = self.restart(tx, &applied).await?;
                let retried = statement.run(tx.as_mut()).await;
                if let Err(e) = retried {
                    warn!("Error executing batch for {}: {}", property, e);
                    report.failed_statements += 1;
                    tx = self.restart(tx, &applied).await?;
                    continue;
                }
            }
            debug!(
                "{} -> {}: {} rows",
                property,
                statement.rel_type,
                statement.rows.len()
            );
            applied.push(statement);
        }

        tx.commit().await?;
        report.relationships_written = applied.iter().map(|s| s.rows.len() as u64).sum();
        debug!("{} property labels cached", self.resolver.cached());
        Ok(report)
    }

    /// Rolls `tx` back and replays `applied` in a new transaction.
    async fn restart(
        &self,
        tx: Box<dyn GraphTransaction>,
        applied: &[BulkStatement],
    ) -> Result<Box<dyn GraphTransaction>> {
        if let Err(e) = tx.rollback().await {
            debug!("Rollback of failed transaction: {}", e);
        }
        let mut tx = self.store.begin().await?;
        for statement in applied {
            statement.run(tx.as_mut()).await?;
        }
        Ok(tx)
    }

    async fn row(
        &mut self,
        tx: &mut dyn GraphTransaction,
        candidate: RelationCandidate,
    ) -> RelationshipRow {
        RelationshipRow {
            start_id: candidate.source_id,
            end_id: candidate.target_id,
            properties: self.qualifier_properties(tx, candidate.qualifiers).await,
        }
    }

    /// Qualifier ids become tokens; unresolved ones keep their raw id.
    async fn qualifier_properties(
        &mut self,
        tx: &mut dyn GraphTransaction,
        qualifiers: BTreeMap<String, String>,
    ) -> HashMap<String, String> {
        let mut properties = HashMap::with_capacity(qualifiers.len());
        for (qualifier, value) in qualifiers {
            let resolution = self.resolver.resolve(tx, &qualifier).await;
            let key = if resolution.resolved {
                resolution.token
            } else {
                qualifier
            };
            properties.insert(key, value);
        }
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryGraphStore, NodeRow};

    async fn seeded_store(labels: &[(&str, &str)]) -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        let rows: Vec<NodeRow> = labels
            .iter()
            .map(|(id, label)| NodeRow {
                id: (*id).to_string(),
                page_id: None,
                label: Some((*label).to_string()),
                description: None,
            })
            .collect();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_nodes("Property", &rows).await.unwrap();
        tx.commit().await.unwrap();
        store
    }

    fn candidate(source: &str, target: &str, qualifiers: &[(&str, &str)]) -> RelationCandidate {
        RelationCandidate {
            source_id: source.to_string(),
            target_id: target.to_string(),
            qualifiers: qualifiers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_commit_resolves_types_and_qualifiers() {
        // Arrange
        let store = seeded_store(&[("P39", "position held"), ("P580", "start time")]).await;
        let mut committer = Committer::new(Arc::new(store.clone()));
        let batch = PendingBatch::from([(
            "P39".to_string(),
            vec![candidate("Q76", "Q11696", &[("P580", "2009"), ("P5054", "x")])],
        )]);

        // Act
        let report = committer.commit(batch).await.unwrap();

        // Assert
        assert_eq!(report.relationships_written, 1);
        let props = store.relationship("Q76", "POSITION_HELD", "Q11696").unwrap();
        assert_eq!(props.get("START_TIME").map(String::as_str), Some("2009"));
        // no Property node for P5054: raw id kept
        assert_eq!(props.get("P5054").map(String::as_str), Some("x"));
    }

    #[tokio::test]
    async fn test_unresolved_property_is_skipped() {
        let store = seeded_store(&[("P31", "instance of")]).await;
        let mut committer = Committer::new(Arc::new(store.clone()));
        let batch = PendingBatch::from([
            ("P31".to_string(), vec![candidate("Q5", "Q515", &[])]),
            ("P9999".to_string(), vec![candidate("Q5", "Q1", &[])]),
        ]);

        let report = committer.commit(batch).await.unwrap();

        assert_eq!(report.skipped_properties, 1);
        assert_eq!(report.relationships_written, 1);
        assert_eq!(store.relationship_types(), vec!["INSTANCE_OF".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_statement_does_not_stop_batch() {
        let store = seeded_store(&[("P31", "instance of"), ("P279", "subclass of")]).await;
        store.reject_relationship_type("INSTANCE_OF");
        let mut committer = Committer::new(Arc::new(store.clone()));
        let batch = PendingBatch::from([
            ("P31".to_string(), vec![candidate("Q5", "Q515", &[])]),
            ("P279".to_string(), vec![candidate("Q5", "Q215627", &[])]),
        ]);

        let report = committer.commit(batch).await.unwrap();

        assert_eq!(report.failed_statements, 1);
        assert_eq!(report.relationships_written, 1);
        assert!(store.relationship("Q5", "SUBCLASS_OF", "Q215627").is_some());
    }

    #[tokio::test]
    async fn test_rejected_statement_replays_accepted_ones() {
        // Arrange: P279 is written first, then P31 poisons the transaction
        let store = seeded_store(&[
            ("P31", "instance of"),
            ("P279", "subclass of"),
            ("P361", "part of"),
        ])
        .await;
        store.reject_relationship_type("INSTANCE_OF");
        let mut committer = Committer::new(Arc::new(store.clone()));
        let batch = PendingBatch::from([
            ("P279".to_string(), vec![candidate("Q5", "Q215627", &[])]),
            ("P31".to_string(), vec![candidate("Q5", "Q515", &[])]),
            ("P361".to_string(), vec![candidate("Q5", "Q2", &[])]),
        ]);

        // Act
        let report = committer.commit(batch).await.unwrap();

        // Assert
        assert_eq!(report.failed_statements, 1);
        assert_eq!(report.relationships_written, 2);
        assert!(store.relationship("Q5", "SUBCLASS_OF", "Q215627").is_some());
        assert!(store.relationship("Q5", "PART_OF", "Q2").is_some());
        assert!(store.relationship("Q5", "INSTANCE_OF", "Q515").is_none());
        assert_eq!(store.stats().commits, 2);
    }

    #[tokio::test]
    async fn test_commit_failure_is_fatal() {
        let store = seeded_store(&[("P31", "instance of")]).await;
        store.fail_commits(true);
        let mut committer = Committer::new(Arc::new(store.clone()));
        let batch = PendingBatch::from([("P31".to_string(), vec![candidate("Q5", "Q515", &[])])]);

        assert!(committer.commit(batch).await.is_err());
        assert_eq!(store.relationship_count(), 0);
    }
}
