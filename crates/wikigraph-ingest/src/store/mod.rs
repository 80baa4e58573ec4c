//! Graph store abstraction.
//!
//! The pipeline only needs a handful of operations: wipe, a uniqueness
//! constraint, and transactions carrying bulk upserts and label lookups.
//! [`Neo4jGraphStore`] talks Bolt to a real server; [`InMemoryGraphStore`]
//! backs dry runs and tests.

pub mod memory;
pub mod neo4j;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

pub use memory::InMemoryGraphStore;
pub use neo4j::Neo4jGraphStore;

/// Label shared by every entity node; carries the unique `id`.
pub const ENTITY_LABEL: &str = "Entity";

/// Property holding the entity id.
pub const ID_PROPERTY: &str = "id";

/// One node to upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    /// Entity id.
    pub id: String,
    /// MediaWiki page id.
    pub page_id: Option<u64>,
    /// Label in the configured locale.
    pub label: Option<String>,
    /// Description in the configured locale.
    pub description: Option<String>,
}

/// One relationship to upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRow {
    /// Source entity id.
    pub start_id: String,
    /// Target entity id.
    pub end_id: String,
    /// Properties that replace whatever the relationship carried before.
    pub properties: HashMap<String, String>,
}

/// A property graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Store type name for logs.
    fn store_type(&self) -> &'static str;

    /// Deletes every node and relationship.
    async fn wipe_all(&self) -> Result<()>;

    /// Creates a uniqueness constraint on `label.property` if missing.
    async fn ensure_unique_constraint(&self, label: &str, property: &str) -> Result<()>;

    /// Opens a write transaction.
    async fn begin(&self) -> Result<Box<dyn GraphTransaction>>;
}

/// An open write transaction.
///
/// Nothing is visible to other readers until [`GraphTransaction::commit`].
#[async_trait]
pub trait GraphTransaction: Send {
    /// Reads the `label` property of the node `(:{node_label} {id})`.
    async fn lookup_label(&mut self, node_label: &str, id: &str) -> Result<Option<String>>;

    /// Merges every row as a node labelled `Entity` and `label`.
    async fn upsert_nodes(&mut self, label: &str, rows: &[NodeRow]) -> Result<()>;

    /// Merges both endpoints and a `rel_type` relationship between them,
    /// then overwrites the relationship's properties.
    async fn upsert_relationships(
        &mut self,
        rel_type: &str,
        rows: &[RelationshipRow],
    ) -> Result<()>;

    /// Makes every write of this transaction durable.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every write of this transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
