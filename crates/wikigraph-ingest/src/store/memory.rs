//! In-memory graph store.
//!
//! Mirrors the merge semantics of the Cypher statements issued by
//! [`super::Neo4jGraphStore`]: nodes are keyed by id, relationships by
//! `(start, type, end)`, and relationship properties are replaced on every
//! upsert. Used for `--dry-run`, tests and benchmarks.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::{GraphStore, GraphTransaction, NodeRow, RelationshipRow, ENTITY_LABEL, ID_PROPERTY};
use crate::error::{Error, Result};

/// A node as stored in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredNode {
    /// Node labels, e.g. `Entity` and `Item`.
    pub labels: BTreeSet<String>,
    /// Node properties.
    pub properties: HashMap<String, Value>,
}

impl StoredNode {
    /// Returns a string property, `None` when absent or null.
    #[must_use]
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }
}

/// Counters of the statements executed against the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Bulk node statements executed.
    pub node_statements: u64,
    /// Bulk relationship statements executed.
    pub relationship_statements: u64,
    /// Transactions committed.
    pub commits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RelKey {
    start: String,
    rel_type: String,
    end: String,
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<String, StoredNode>,
    relationships: BTreeMap<RelKey, HashMap<String, String>>,
    constraints: BTreeSet<(String, String)>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<GraphState>,
    rejected_types: Mutex<HashSet<String>>,
    fail_commits: AtomicBool,
    node_statements: AtomicU64,
    relationship_statements: AtomicU64,
    commits: AtomicU64,
}

/// Graph store kept entirely in memory.
#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    inner: Arc<Inner>,
}

impl InMemoryGraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every bulk statement for `rel_type` fail.
    pub fn reject_relationship_type(&self, rel_type: &str) {
        self.inner.rejected_types.lock().insert(rel_type.to_string());
    }

    /// Makes every commit fail, as a lost connection would.
    pub fn fail_commits(&self, fail: bool) {
        self.inner.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Returns a copy of the node with `id`.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<StoredNode> {
        self.inner.state.lock().nodes.get(id).cloned()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.state.lock().nodes.len()
    }

    /// Properties of the `(start)-[rel_type]->(end)` relationship.
    #[must_use]
    pub fn relationship(
        &self,
        start: &str,
        rel_type: &str,
        end: &str,
    ) -> Option<HashMap<String, String>> {
        let key = RelKey {
            start: start.to_string(),
            rel_type: rel_type.to_string(),
            end: end.to_string(),
        };
        self.inner.state.lock().relationships.get(&key).cloned()
    }

    /// Number of relationships.
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.inner.state.lock().relationships.len()
    }

    /// Distinct relationship types present, sorted.
    #[must_use]
    pub fn relationship_types(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let types: BTreeSet<&String> = state.relationships.keys().map(|k| &k.rel_type).collect();
        types.into_iter().cloned().collect()
    }

    /// Whether a uniqueness constraint exists on `label.property`.
    #[must_use]
    pub fn has_constraint(&self, label: &str, property: &str) -> bool {
        self.inner
            .state
            .lock()
            .constraints
            .contains(&(label.to_string(), property.to_string()))
    }

    /// Statement counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            node_statements: self.inner.node_statements.load(Ordering::SeqCst),
            relationship_statements: self.inner.relationship_statements.load(Ordering::SeqCst),
            commits: self.inner.commits.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    fn store_type(&self) -> &'static str {
        "memory"
    }

    async fn wipe_all(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.nodes.clear();
        state.relationships.clear();
        Ok(())
    }

    async fn ensure_unique_constraint(&self, label: &str, property: &str) -> Result<()> {
        self.inner
            .state
            .lock()
            .constraints
            .insert((label.to_string(), property.to_string()));
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn GraphTransaction>> {
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            pending: Vec::new(),
            failed: false,
        }))
    }
}

enum PendingWrite {
    Nodes(String, Vec<NodeRow>),
    Relationships(String, Vec<RelationshipRow>),
}

/// Buffers writes until commit. Lookups see committed state only.
///
/// Like a Neo4j transaction, one failed statement fails the transaction:
/// every later statement and the commit are refused.
struct MemoryTransaction {
    inner: Arc<Inner>,
    pending: Vec<PendingWrite>,
    failed: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<()> {
        if self.failed {
            return Err(Error::Store(
                "transaction has failed and must be rolled back".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphTransaction for MemoryTransaction {
    async fn lookup_label(&mut self, node_label: &str, id: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        let state = self.inner.state.lock();
        Ok(state
            .nodes
            .get(id)
            .filter(|node| node.labels.contains(node_label))
            .and_then(|node| node.property_str("label"))
            .map(str::to_string))
    }

    async fn upsert_nodes(&mut self, label: &str, rows: &[NodeRow]) -> Result<()> {
        self.ensure_open()?;
        if rows.is_empty() {
            return Ok(());
        }
        self.inner.node_statements.fetch_add(1, Ordering::SeqCst);
        self.pending
            .push(PendingWrite::Nodes(label.to_string(), rows.to_vec()));
        Ok(())
    }

    async fn upsert_relationships(
        &mut self,
        rel_type: &str,
        rows: &[RelationshipRow],
    ) -> Result<()> {
        self.ensure_open()?;
        if self.inner.rejected_types.lock().contains(rel_type) {
            self.failed = true;
            return Err(Error::Store(format!(
                "statement for relationship type {rel_type} rejected"
            )));
        }
        if rows.is_empty() {
            return Ok(());
        }
        self.inner
            .relationship_statements
            .fetch_add(1, Ordering::SeqCst);
        self.pending
            .push(PendingWrite::Relationships(rel_type.to_string(), rows.to_vec()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.ensure_open()?;
        let this = *self;
        if this.inner.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::Store("connection lost during commit".to_string()));
        }

        let mut state = this.inner.state.lock();
        for write in this.pending {
            match write {
                PendingWrite::Nodes(label, rows) => {
                    for row in rows {
                        apply_node(&mut state, &label, row);
                    }
                }
                PendingWrite::Relationships(rel_type, rows) => {
                    for row in rows {
                        apply_relationship(&mut state, &rel_type, row);
                    }
                }
            }
        }
        drop(state);

        this.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn merge_entity<'a>(state: &'a mut GraphState, id: &str) -> &'a mut StoredNode {
    let node = state.nodes.entry(id.to_string()).or_default();
    node.labels.insert(ENTITY_LABEL.to_string());
    node.properties
        .insert(ID_PROPERTY.to_string(), Value::String(id.to_string()));
    node
}

fn apply_node(state: &mut GraphState, label: &str, row: NodeRow) {
    let node = merge_entity(state, &row.id);
    node.labels.insert(label.to_string());
    node.properties.insert(
        "pageId".to_string(),
        row.page_id.map_or(Value::Null, Value::from),
    );
    node.properties.insert(
        "label".to_string(),
        row.label.map_or(Value::Null, Value::String),
    );
    node.properties.insert(
        "description".to_string(),
        row.description.map_or(Value::Null, Value::String),
    );
}

fn apply_relationship(state: &mut GraphState, rel_type: &str, row: RelationshipRow) {
    merge_entity(state, &row.start_id);
    merge_entity(state, &row.end_id);
    let key = RelKey {
        start: row.start_id,
        rel_type: rel_type.to_string(),
        end: row.end_id,
    };
    state.relationships.insert(key, row.properties);
}
